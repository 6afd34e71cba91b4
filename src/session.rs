use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use lily_api_types::{epoch_ms, Session, SessionId};
use lily_config::SessionPolicy;

use crate::LilyError;

// Collisions on 128 random bits mean the entropy source is broken, not
// that we are unlucky; a handful of retries is already generous.
const MAX_ID_ATTEMPTS: usize = 16;

/// The in-memory session table.
pub struct SessionRegistry {
    state: RwLock<HashMap<SessionId, Session>>,
    policy: SessionPolicy,
}

impl SessionRegistry {
    pub fn new(policy: SessionPolicy) -> Self {
        Self {
            state: RwLock::new(HashMap::new()),
            policy,
        }
    }

    pub fn policy(&self) -> &SessionPolicy {
        &self.policy
    }

    fn generate_id(taken: &HashMap<SessionId, Session>) -> Result<SessionId, LilyError> {
        for _ in 0..MAX_ID_ATTEMPTS {
            let mut raw = [0u8; 16];
            openssl::rand::rand_bytes(&mut raw).map_err(|_| LilyError::SessionIdExhausted)?;
            let id = SessionId::from_bytes(raw);
            if !taken.contains_key(&id) {
                return Ok(id);
            }
        }
        Err(LilyError::SessionIdExhausted)
    }

    /// Check an `expire_after` request against the policy.
    pub fn check_expire_after(&self, expire_after: Duration) -> Result<(), LilyError> {
        if expire_after.is_zero() {
            if !self.policy.allow_non_expiring {
                return Err(LilyError::NonExpiringForbidden);
            }
            return Ok(());
        }
        if let Some(max) = self.policy.max_expire_secs {
            if expire_after.as_secs() > max {
                return Err(LilyError::InvalidTimeout);
            }
        }
        Ok(())
    }

    /// Create a session for a user. When the user is at the per-user cap
    /// the call fails; existing sessions are never silently evicted.
    pub fn create(&self, username: &str, expire_after: Duration) -> Result<Session, LilyError> {
        self.check_expire_after(expire_after)?;

        let now = epoch_ms();
        let mut state = self.state.write().unwrap();

        let live = state
            .values()
            .filter(|s| s.username == username && !s.is_expired(now))
            .count();
        if live >= self.policy.per_user_limit {
            return Err(LilyError::SessionLimit);
        }

        let id = Self::generate_id(&state)?;
        let session = Session::new(id, username, expire_after);
        state.insert(id, session.clone());
        Ok(session)
    }

    pub fn get(&self, id: &SessionId) -> Option<Session> {
        self.state.read().unwrap().get(id).cloned()
    }

    /// The authentication path: the session must exist, be unexpired and
    /// belong to the presented username. Success refreshes the expiry, so
    /// active traffic keeps a session alive.
    pub fn verify_and_refresh(&self, id: &SessionId, username: &str) -> Option<Session> {
        let now = epoch_ms();
        let mut state = self.state.write().unwrap();
        let session = state.get_mut(id)?;
        if session.is_expired(now) || session.username != username {
            return None;
        }
        session.refresh(now);
        Some(session.clone())
    }

    /// Replace a live session's expire-after and restart its expiry clock.
    pub fn set_expire_after(
        &self,
        id: &SessionId,
        expire_after: Duration,
    ) -> Result<(), LilyError> {
        self.check_expire_after(expire_after)?;

        let mut state = self.state.write().unwrap();
        let session = state
            .get_mut(id)
            .ok_or_else(|| LilyError::NoSuchSession(id.to_string()))?;
        session.expire_after = expire_after;
        session.refresh(epoch_ms());
        Ok(())
    }

    pub fn remove(&self, id: &SessionId) -> bool {
        self.state.write().unwrap().remove(id).is_some()
    }

    /// Remove a batch of sessions. When `strict`, any missing id fails the
    /// whole batch before anything is removed.
    pub fn remove_many(&self, ids: &[SessionId], strict: bool) -> Result<(), LilyError> {
        let mut state = self.state.write().unwrap();
        if strict {
            for id in ids {
                if !state.contains_key(id) {
                    return Err(LilyError::NoSuchSession(id.to_string()));
                }
            }
        }
        for id in ids {
            state.remove(id);
        }
        Ok(())
    }

    pub fn expire_all(&self) -> usize {
        let mut state = self.state.write().unwrap();
        let count = state.len();
        state.clear();
        count
    }

    /// Drop every expired session. Non-expiring sessions are left alone.
    pub fn sweep(&self) -> usize {
        let now = epoch_ms();
        let mut state = self.state.write().unwrap();
        let before = state.len();
        state.retain(|_, session| !session.is_expired(now));
        before - state.len()
    }

    pub fn all_sessions(&self) -> Vec<Session> {
        self.state.read().unwrap().values().cloned().collect()
    }

    pub fn user_sessions(&self, username: &str, live_only: bool) -> Vec<Session> {
        let now = epoch_ms();
        self.state
            .read()
            .unwrap()
            .values()
            .filter(|s| s.username == username && (!live_only || !s.is_expired(now)))
            .cloned()
            .collect()
    }

    /// Remove every session belonging to a user, regardless of expiry.
    pub fn remove_user_sessions(&self, username: &str) -> usize {
        let mut state = self.state.write().unwrap();
        let before = state.len();
        state.retain(|_, session| session.username != username);
        before - state.len()
    }

    pub fn len(&self) -> usize {
        self.state.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().unwrap().is_empty()
    }
}
