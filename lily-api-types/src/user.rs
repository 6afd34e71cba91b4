use serde::{Deserialize, Serialize};

use crate::Clearance;

#[derive(Debug, thiserror::Error)]
pub enum NameError {
    #[error("name must not be empty")]
    Empty,
    #[error("name '{0}' contains a path separator")]
    Separator(String),
}

/// Usernames and node names share the same syntax: non-empty, no path
/// separator.
pub fn validate_username(name: &str) -> Result<(), NameError> {
    if name.is_empty() {
        return Err(NameError::Empty);
    }
    if name.contains('/') {
        return Err(NameError::Separator(name.to_string()));
    }
    Ok(())
}

/// A registered account. The password is only ever stored in hashed form.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    pub name: String,
    pub password_hash: String,
    pub clearance: Clearance,
}

/// The authenticated identity a command executes as.
#[derive(Clone, Debug)]
pub struct Actor {
    pub username: String,
    pub clearance: Clearance,
}

impl Actor {
    pub fn new(username: impl Into<String>, clearance: Clearance) -> Self {
        Self {
            username: username.into(),
            clearance,
        }
    }
}
