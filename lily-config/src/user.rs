use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use anyhow::{format_err, Error};

use lily_api_types::{validate_username, Clearance, User};

use crate::crypt;

#[derive(Debug, thiserror::Error)]
pub enum UserError {
    #[error("user '{0}' does not exist")]
    NotFound(String),
    #[error("user '{0}' already exists")]
    Exists(String),
    #[error("invalid username: {0}")]
    InvalidName(#[from] lily_api_types::NameError),
    #[error("password hash failed: {0}")]
    HashFailed(Error),
}

/// The in-memory user table.
///
/// All operations are atomic with respect to the registry lock. Mutations
/// set the dirty flag; the persistence cron clears it after a successful
/// save, so a failed save retries on the next tick.
pub struct UserRegistry {
    state: RwLock<HashMap<String, User>>,
    dirty: AtomicBool,
}

impl Default for UserRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl UserRegistry {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(HashMap::new()),
            dirty: AtomicBool::new(false),
        }
    }

    /// Load the registry from its JSON file. A missing file yields an empty
    /// registry (first server start).
    pub fn load(path: &Path) -> Result<Self, Error> {
        let raw = match std::fs::read(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::new());
            }
            Err(err) => return Err(format_err!("unable to read {:?} - {}", path, err)),
        };

        let users: Vec<User> = serde_json::from_slice(&raw)
            .map_err(|err| format_err!("unable to parse user registry {:?} - {}", path, err))?;

        let mut map = HashMap::new();
        for user in users {
            validate_username(&user.name)?;
            if map.insert(user.name.clone(), user).is_some() {
                return Err(format_err!("duplicate user in registry file {:?}", path));
            }
        }

        Ok(Self {
            state: RwLock::new(map),
            dirty: AtomicBool::new(false),
        })
    }

    /// Persist the registry and clear the dirty flag.
    pub fn save(&self, path: &Path) -> Result<(), Error> {
        let raw = {
            let state = self.state.read().unwrap();
            let mut users: Vec<&User> = state.values().collect();
            users.sort_by(|a, b| a.name.cmp(&b.name));
            serde_json::to_vec_pretty(&users)?
        };

        crate::replace_file(path, &raw)?;
        self.dirty.store(false, Ordering::SeqCst);
        Ok(())
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }

    pub fn list(&self) -> Vec<String> {
        let state = self.state.read().unwrap();
        let mut names: Vec<String> = state.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.state.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().unwrap().is_empty()
    }

    pub fn get(&self, name: &str) -> Option<User> {
        self.state.read().unwrap().get(name).cloned()
    }

    /// Look up a batch of users; any missing name fails the whole batch.
    pub fn get_many(&self, names: &[String]) -> Result<Vec<User>, UserError> {
        let state = self.state.read().unwrap();
        names
            .iter()
            .map(|name| {
                state
                    .get(name)
                    .cloned()
                    .ok_or_else(|| UserError::NotFound(name.clone()))
            })
            .collect()
    }

    /// Create a user. The password is hashed before the registry lock is
    /// taken, so a crash mid-insert can never leave a user with an empty
    /// hash.
    pub fn create(
        &self,
        name: &str,
        password: &str,
        clearance: Clearance,
    ) -> Result<(), UserError> {
        validate_username(name)?;
        if self.state.read().unwrap().contains_key(name) {
            return Err(UserError::Exists(name.to_string()));
        }

        let password_hash = crypt::encrypt_pw(password).map_err(UserError::HashFailed)?;

        let mut state = self.state.write().unwrap();
        if state.contains_key(name) {
            return Err(UserError::Exists(name.to_string()));
        }
        state.insert(
            name.to_string(),
            User {
                name: name.to_string(),
                password_hash,
                clearance,
            },
        );
        drop(state);

        self.mark_dirty();
        Ok(())
    }

    /// Remove a batch of users. Strict: if any name is missing, nothing is
    /// removed.
    pub fn remove_many(&self, names: &[String]) -> Result<(), UserError> {
        let mut state = self.state.write().unwrap();
        for name in names {
            if !state.contains_key(name) {
                return Err(UserError::NotFound(name.clone()));
            }
        }
        for name in names {
            state.remove(name);
        }
        drop(state);

        self.mark_dirty();
        Ok(())
    }

    pub fn set_password(&self, name: &str, password: &str) -> Result<(), UserError> {
        let password_hash = crypt::encrypt_pw(password).map_err(UserError::HashFailed)?;

        let mut state = self.state.write().unwrap();
        let user = state
            .get_mut(name)
            .ok_or_else(|| UserError::NotFound(name.to_string()))?;
        user.password_hash = password_hash;
        drop(state);

        self.mark_dirty();
        Ok(())
    }

    pub fn set_clearance(&self, name: &str, clearance: Clearance) -> Result<(), UserError> {
        let mut state = self.state.write().unwrap();
        let user = state
            .get_mut(name)
            .ok_or_else(|| UserError::NotFound(name.to_string()))?;
        user.clearance = clearance;
        drop(state);

        self.mark_dirty();
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use lily_api_types::Clearance;

    use super::{UserError, UserRegistry};

    #[test]
    fn test_create_and_lookup() {
        let registry = UserRegistry::new();
        registry.create("alice", "secret", Clearance::Level2).unwrap();

        let user = registry.get("alice").unwrap();
        assert_eq!(user.clearance, Clearance::Level2);
        crate::crypt::verify_pw("secret", &user.password_hash).unwrap();

        assert!(registry.get("bob").is_none());
        assert!(registry.is_dirty());
    }

    #[test]
    fn test_duplicate_create() {
        let registry = UserRegistry::new();
        registry.create("a", "x", Clearance::Level1).unwrap();
        match registry.create("a", "y", Clearance::Level1) {
            Err(UserError::Exists(_)) => {}
            other => panic!("expected Exists, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_invalid_names() {
        let registry = UserRegistry::new();
        assert!(registry.create("", "x", Clearance::Level1).is_err());
        assert!(registry.create("a/b", "x", Clearance::Level1).is_err());
    }

    #[test]
    fn test_remove_many_strict() {
        let registry = UserRegistry::new();
        registry.create("a", "x", Clearance::Level1).unwrap();
        registry.create("b", "x", Clearance::Level1).unwrap();

        let names = vec!["a".to_string(), "ghost".to_string()];
        assert!(registry.remove_many(&names).is_err());
        // strict failure removed nothing
        assert!(registry.get("a").is_some());

        registry
            .remove_many(&["a".to_string(), "b".to_string()])
            .unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");

        let registry = UserRegistry::new();
        registry.create("a", "pw-a", Clearance::Level1).unwrap();
        registry.create("b", "pw-b", Clearance::Level5).unwrap();
        registry.save(&path).unwrap();
        assert!(!registry.is_dirty());

        let loaded = UserRegistry::load(&path).unwrap();
        assert_eq!(loaded.list(), vec!["a".to_string(), "b".to_string()]);
        let b = loaded.get("b").unwrap();
        assert_eq!(b.clearance, Clearance::Level5);
        crate::crypt::verify_pw("pw-b", &b.password_hash).unwrap();
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let registry = UserRegistry::load(&dir.path().join("absent.json")).unwrap();
        assert!(registry.is_empty());
    }
}
