//! Uniform verification of the two authentication variants.

use lily_api_types::{Actor, Auth, Clearance, SessionId};
use lily_config::{crypt, UserRegistry};

use crate::session::SessionRegistry;
use crate::LilyError;

/// Authenticate a request's auth material against the registries.
///
/// Every failure reports the same `auth` error; credential and session
/// failures are indistinguishable by design.
pub fn authenticate(
    auth: &Auth,
    users: &UserRegistry,
    sessions: &SessionRegistry,
) -> Result<Actor, LilyError> {
    match auth {
        Auth::Anonymous => Err(LilyError::Auth),
        Auth::Credential { username, password } => {
            let user = users.get(username).ok_or(LilyError::Auth)?;
            crypt::verify_pw(password, &user.password_hash).map_err(|_| LilyError::Auth)?;
            Ok(Actor::new(username.clone(), user.clearance))
        }
        Auth::Session { id, username } => {
            let session = sessions
                .verify_and_refresh(id, username)
                .ok_or(LilyError::Auth)?;
            // the account may have been deleted since login
            let user = users.get(&session.username).ok_or(LilyError::Auth)?;
            Ok(Actor::new(session.username, user.clearance))
        }
    }
}

/// Commands narrowed to a single auth variant reject the other with the
/// same auth error.
pub fn require_credential(auth: &Auth) -> Result<(), LilyError> {
    match auth {
        Auth::Credential { .. } => Ok(()),
        _ => Err(LilyError::Auth),
    }
}

pub fn require_session(auth: &Auth) -> Result<SessionId, LilyError> {
    match auth {
        Auth::Session { id, .. } => Ok(*id),
        _ => Err(LilyError::Auth),
    }
}

pub fn require_admin(actor: &Actor) -> Result<(), LilyError> {
    if actor.clearance == Clearance::Level5 {
        Ok(())
    } else {
        Err(LilyError::Clearance)
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use lily_api_types::{Auth, Clearance, SessionId};
    use lily_config::{SessionPolicy, UserRegistry};

    use super::{authenticate, require_admin, require_credential, require_session};
    use crate::session::SessionRegistry;
    use crate::LilyError;

    fn registries() -> (UserRegistry, SessionRegistry) {
        let users = UserRegistry::new();
        users.create("alice", "secret", Clearance::Level3).unwrap();
        let sessions = SessionRegistry::new(SessionPolicy::default());
        (users, sessions)
    }

    #[test]
    fn test_credential_auth() {
        let (users, sessions) = registries();

        let auth = Auth::Credential {
            username: "alice".into(),
            password: "secret".into(),
        };
        let actor = authenticate(&auth, &users, &sessions).unwrap();
        assert_eq!(actor.username, "alice");
        assert_eq!(actor.clearance, Clearance::Level3);

        let bad = Auth::Credential {
            username: "alice".into(),
            password: "wrong".into(),
        };
        assert!(matches!(
            authenticate(&bad, &users, &sessions),
            Err(LilyError::Auth)
        ));

        let ghost = Auth::Credential {
            username: "ghost".into(),
            password: "secret".into(),
        };
        assert!(matches!(
            authenticate(&ghost, &users, &sessions),
            Err(LilyError::Auth)
        ));
    }

    #[test]
    fn test_session_auth_refreshes() {
        let (users, sessions) = registries();
        let session = sessions.create("alice", Duration::from_secs(60)).unwrap();

        let auth = Auth::Session {
            id: session.id,
            username: "alice".into(),
        };
        authenticate(&auth, &users, &sessions).unwrap();

        let refreshed = sessions.get(&session.id).unwrap();
        assert!(refreshed.expire_at >= session.expire_at);

        // presented username must match the session's owner
        let mismatch = Auth::Session {
            id: session.id,
            username: "bob".into(),
        };
        assert!(matches!(
            authenticate(&mismatch, &users, &sessions),
            Err(LilyError::Auth)
        ));

        let unknown = Auth::Session {
            id: SessionId::from_bytes([9; 16]),
            username: "alice".into(),
        };
        assert!(matches!(
            authenticate(&unknown, &users, &sessions),
            Err(LilyError::Auth)
        ));
    }

    #[test]
    fn test_variant_narrowing() {
        let anon = Auth::Anonymous;
        assert!(require_credential(&anon).is_err());
        assert!(require_session(&anon).is_err());

        let cred = Auth::Credential {
            username: "a".into(),
            password: "p".into(),
        };
        assert!(require_credential(&cred).is_ok());
        assert!(require_session(&cred).is_err());
    }

    #[test]
    fn test_require_admin() {
        use lily_api_types::Actor;
        assert!(require_admin(&Actor::new("root", Clearance::Level5)).is_ok());
        assert!(require_admin(&Actor::new("user", Clearance::Level4)).is_err());
    }
}
