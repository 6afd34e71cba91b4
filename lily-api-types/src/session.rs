use std::time::Duration;

use crate::epoch_ms;

/// A 128 bit session identifier, rendered as 32 hex digits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId([u8; 16]);

#[derive(Debug, thiserror::Error)]
#[error("malformed session id")]
pub struct SessionIdParseError;

impl SessionId {
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl std::str::FromStr for SessionId {
    type Err = SessionIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = hex::decode(s).map_err(|_| SessionIdParseError)?;
        let bytes: [u8; 16] = raw.try_into().map_err(|_| SessionIdParseError)?;
        Ok(Self(bytes))
    }
}

/// A live login. `expire_after` of zero marks a non-expiring session;
/// otherwise every successful authentication pushes `expire_at` forward, so
/// active traffic keeps the session alive.
#[derive(Clone, Debug)]
pub struct Session {
    pub id: SessionId,
    pub username: String,
    pub expire_after: Duration,
    pub expire_at: i64,
}

impl Session {
    pub fn new(id: SessionId, username: impl Into<String>, expire_after: Duration) -> Self {
        let mut session = Self {
            id,
            username: username.into(),
            expire_after,
            expire_at: 0,
        };
        session.refresh(epoch_ms());
        session
    }

    pub fn never_expires(&self) -> bool {
        self.expire_after.is_zero()
    }

    pub fn refresh(&mut self, now_ms: i64) {
        if !self.never_expires() {
            self.expire_at = now_ms + self.expire_after.as_millis() as i64;
        }
    }

    pub fn is_expired(&self, now_ms: i64) -> bool {
        !self.never_expires() && now_ms >= self.expire_at
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::{Session, SessionId};

    #[test]
    fn test_session_id_roundtrip() {
        let id = SessionId::from_bytes([0xab; 16]);
        let text = id.to_string();
        assert_eq!(text.len(), 32);
        assert_eq!(text.parse::<SessionId>().unwrap(), id);

        assert!("xyz".parse::<SessionId>().is_err());
        assert!("abcd".parse::<SessionId>().is_err());
    }

    #[test]
    fn test_session_expiry_refresh() {
        let mut session = Session::new(
            SessionId::from_bytes([1; 16]),
            "a",
            Duration::from_secs(10),
        );
        let now = session.expire_at - 10_000;

        assert!(!session.is_expired(now));
        assert!(session.is_expired(now + 10_000));
        assert!(session.is_expired(now + 20_000));

        session.refresh(now + 9_000);
        assert!(!session.is_expired(now + 10_000));
        assert!(session.is_expired(now + 19_000));
    }

    #[test]
    fn test_non_expiring_session() {
        let session = Session::new(SessionId::from_bytes([2; 16]), "a", Duration::ZERO);
        assert!(session.never_expires());
        assert!(!session.is_expired(i64::MAX));
    }
}
