use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{Actor, Clearance, ClearanceError};

/// Per-path access policy.
///
/// Two clearance thresholds gate reading (`access`) and writing (`modify`),
/// with the invariant `access <= modify`. Explicit whitelists grant a named
/// user the capability regardless of clearance; blacklists withdraw the
/// clearance grant but are themselves overridden by the whitelist.
/// Administrators bypass the whole policy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessSettings {
    access: Clearance,
    modify: Clearance,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    access_whitelist: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    modify_whitelist: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    access_blacklist: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    modify_blacklist: BTreeSet<String>,
}

impl AccessSettings {
    pub fn new(access: Clearance, modify: Clearance) -> Result<Self, ClearanceError> {
        check_clearance_pair(access, modify)?;
        Ok(Self {
            access,
            modify,
            access_whitelist: BTreeSet::new(),
            modify_whitelist: BTreeSet::new(),
            access_blacklist: BTreeSet::new(),
            modify_blacklist: BTreeSet::new(),
        })
    }

    /// Settings for a drive root: every authenticated user may read and
    /// write.
    pub fn allow_all() -> Self {
        Self::new(Clearance::Level1, Clearance::Level1).unwrap()
    }

    pub fn access(&self) -> Clearance {
        self.access
    }

    pub fn modify(&self) -> Clearance {
        self.modify
    }

    pub fn set_clearances(
        &mut self,
        access: Clearance,
        modify: Clearance,
    ) -> Result<(), ClearanceError> {
        check_clearance_pair(access, modify)?;
        self.access = access;
        self.modify = modify;
        Ok(())
    }

    pub fn can_access(&self, actor: &Actor) -> bool {
        if actor.clearance.is_admin() {
            return true;
        }
        if self.access_whitelist.contains(&actor.username) {
            return true;
        }
        actor.clearance >= self.access && !self.access_blacklist.contains(&actor.username)
    }

    pub fn can_modify(&self, actor: &Actor) -> bool {
        if actor.clearance.is_admin() {
            return true;
        }
        if self.modify_whitelist.contains(&actor.username) {
            return true;
        }
        actor.clearance >= self.modify && !self.modify_blacklist.contains(&actor.username)
    }

    /// Whitelist/blacklist mutations are idempotent set operations; adding a
    /// present name or removing an absent one is a no-op.
    pub fn add_whitelist(&mut self, modify: bool, name: &str) {
        self.whitelist_mut(modify).insert(name.to_string());
    }

    pub fn remove_whitelist(&mut self, modify: bool, name: &str) {
        self.whitelist_mut(modify).remove(name);
    }

    pub fn add_blacklist(&mut self, modify: bool, name: &str) {
        self.blacklist_mut(modify).insert(name.to_string());
    }

    pub fn remove_blacklist(&mut self, modify: bool, name: &str) {
        self.blacklist_mut(modify).remove(name);
    }

    pub fn whitelist(&self, modify: bool) -> &BTreeSet<String> {
        if modify {
            &self.modify_whitelist
        } else {
            &self.access_whitelist
        }
    }

    pub fn blacklist(&self, modify: bool) -> &BTreeSet<String> {
        if modify {
            &self.modify_blacklist
        } else {
            &self.access_blacklist
        }
    }

    fn whitelist_mut(&mut self, modify: bool) -> &mut BTreeSet<String> {
        if modify {
            &mut self.modify_whitelist
        } else {
            &mut self.access_whitelist
        }
    }

    fn blacklist_mut(&mut self, modify: bool) -> &mut BTreeSet<String> {
        if modify {
            &mut self.modify_blacklist
        } else {
            &mut self.access_blacklist
        }
    }
}

fn check_clearance_pair(access: Clearance, modify: Clearance) -> Result<(), ClearanceError> {
    if access == Clearance::None {
        return Err(ClearanceError(0));
    }
    if modify == Clearance::None {
        return Err(ClearanceError(0));
    }
    if access > modify {
        return Err(ClearanceError(access.level() as i64));
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::AccessSettings;
    use crate::{Actor, Clearance};

    fn actor(name: &str, level: i64) -> Actor {
        Actor {
            username: name.to_string(),
            clearance: Clearance::from_level(level).unwrap(),
        }
    }

    #[test]
    fn test_clearance_thresholds() {
        let settings = AccessSettings::new(Clearance::Level2, Clearance::Level4).unwrap();

        assert!(!settings.can_access(&actor("a", 1)));
        assert!(settings.can_access(&actor("a", 2)));
        assert!(!settings.can_modify(&actor("a", 3)));
        assert!(settings.can_modify(&actor("a", 4)));
    }

    #[test]
    fn test_admin_bypasses_blacklist() {
        let mut settings = AccessSettings::new(Clearance::Level1, Clearance::Level1).unwrap();
        settings.add_blacklist(false, "root");
        settings.add_blacklist(true, "root");

        assert!(settings.can_access(&actor("root", 5)));
        assert!(settings.can_modify(&actor("root", 5)));
    }

    #[test]
    fn test_whitelist_overrides_clearance() {
        let mut settings = AccessSettings::new(Clearance::Level4, Clearance::Level4).unwrap();
        settings.add_whitelist(false, "guest");

        assert!(settings.can_access(&actor("guest", 1)));
        assert!(!settings.can_modify(&actor("guest", 1)));
        assert!(!settings.can_access(&actor("other", 1)));
    }

    #[test]
    fn test_blacklist_withdraws_clearance() {
        let mut settings = AccessSettings::new(Clearance::Level1, Clearance::Level1).unwrap();
        settings.add_blacklist(false, "b");

        assert!(!settings.can_access(&actor("b", 4)));
        assert!(settings.can_access(&actor("a", 1)));

        // whitelist wins over blacklist
        settings.add_whitelist(false, "b");
        assert!(settings.can_access(&actor("b", 4)));
    }

    #[test]
    fn test_invalid_clearance_pairs() {
        assert!(AccessSettings::new(Clearance::Level3, Clearance::Level2).is_err());
        assert!(AccessSettings::new(Clearance::None, Clearance::Level2).is_err());

        let mut settings = AccessSettings::allow_all();
        assert!(settings
            .set_clearances(Clearance::Level3, Clearance::Level2)
            .is_err());
        // failed update leaves the settings untouched
        assert_eq!(settings.access(), Clearance::Level1);
        assert_eq!(settings.modify(), Clearance::Level1);
    }

    #[test]
    fn test_list_mutations_idempotent() {
        let mut settings = AccessSettings::allow_all();
        settings.add_whitelist(true, "x");
        settings.add_whitelist(true, "x");
        assert_eq!(settings.whitelist(true).len(), 1);

        settings.remove_whitelist(true, "x");
        settings.remove_whitelist(true, "x");
        assert!(settings.whitelist(true).is_empty());
    }
}
