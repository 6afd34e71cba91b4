use serde::{Deserialize, Serialize};

/// Security clearance carried by every user and by every path's access
/// settings.
///
/// Levels are totally ordered; a higher level dominates a lower one. Level
/// five is the administrator, which bypasses all per-path checks. `None` is
/// the explicit "no clearance" sentinel and never satisfies a threshold.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(into = "u8", try_from = "u8")]
pub enum Clearance {
    None = 0,
    Level1 = 1,
    Level2 = 2,
    Level3 = 3,
    Level4 = 4,
    Level5 = 5,
}

#[derive(Debug, thiserror::Error)]
#[error("invalid clearance level {0}, expected 1..=5")]
pub struct ClearanceError(pub i64);

impl Clearance {
    /// Parse a user supplied level. Only 1..=5 are valid here - the `None`
    /// sentinel cannot be assigned explicitly.
    pub fn from_level(level: i64) -> Result<Self, ClearanceError> {
        match level {
            1 => Ok(Clearance::Level1),
            2 => Ok(Clearance::Level2),
            3 => Ok(Clearance::Level3),
            4 => Ok(Clearance::Level4),
            5 => Ok(Clearance::Level5),
            other => Err(ClearanceError(other)),
        }
    }

    pub fn level(self) -> u8 {
        self as u8
    }

    /// Level five administrators bypass all access checks.
    pub fn is_admin(self) -> bool {
        self == Clearance::Level5
    }
}

impl From<Clearance> for u8 {
    fn from(clearance: Clearance) -> u8 {
        clearance as u8
    }
}

impl TryFrom<u8> for Clearance {
    type Error = ClearanceError;

    fn try_from(v: u8) -> Result<Self, ClearanceError> {
        if v == 0 {
            return Ok(Clearance::None);
        }
        Clearance::from_level(v as i64)
    }
}

impl std::fmt::Display for Clearance {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.level())
    }
}

#[cfg(test)]
mod test {
    use super::Clearance;

    #[test]
    fn test_clearance_ordering() {
        assert!(Clearance::None < Clearance::Level1);
        assert!(Clearance::Level1 < Clearance::Level5);
        assert!(Clearance::Level3 >= Clearance::Level3);
        assert!(Clearance::Level5.is_admin());
        assert!(!Clearance::Level4.is_admin());
    }

    #[test]
    fn test_clearance_parse() {
        assert_eq!(Clearance::from_level(3).unwrap(), Clearance::Level3);
        assert!(Clearance::from_level(0).is_err());
        assert!(Clearance::from_level(6).is_err());
        assert!(Clearance::from_level(-1).is_err());
    }
}
