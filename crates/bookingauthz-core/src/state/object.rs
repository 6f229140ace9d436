use std::collections::HashMap;

use parking_lot::RwLock;

use crate::acl::{AclEntry, AclEntryId};
use crate::object_type::Role;
use crate::user_id_set::UserIdSet;

/// Users holding each role on one object.
#[derive(Debug, Default)]
pub struct AclObjectState {
    inner: RwLock<ObjectStateInner>,
}

#[derive(Debug, Default)]
struct ObjectStateInner {
    /// Each entry with the users its identity resolved to when added.
    entries: HashMap<AclEntryId, (AclEntry, UserIdSet)>,
    members: HashMap<Role, UserIdSet>,
}

impl AclObjectState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when the entry was already present.
    pub fn add_entry(&self, entry: &AclEntry, user_ids: UserIdSet) -> bool {
        let mut inner = self.inner.write();
        if inner.entries.contains_key(&entry.id) {
            return false;
        }
        inner
            .members
            .entry(entry.role.clone())
            .or_default()
            .union(&user_ids);
        inner.entries.insert(entry.id, (entry.clone(), user_ids));
        true
    }

    /// Returns `false` when the entry was not present.
    pub fn remove_entry(&self, entry: &AclEntry) -> bool {
        let mut inner = self.inner.write();
        let Some((removed, _)) = inner.entries.remove(&entry.id) else {
            return false;
        };

        let mut members = UserIdSet::new();
        let mut holders = 0;
        for (other, user_ids) in inner.entries.values() {
            if other.role == removed.role {
                members.union(user_ids);
                holders += 1;
            }
        }
        if holders == 0 {
            inner.members.remove(&removed.role);
        } else {
            inner.members.insert(removed.role, members);
        }
        true
    }

    pub fn user_ids_with_role(&self, role: &Role) -> UserIdSet {
        self.inner
            .read()
            .members
            .get(role)
            .cloned()
            .unwrap_or_default()
    }

    pub fn entries(&self) -> Vec<AclEntry> {
        self.inner
            .read()
            .entries
            .values()
            .map(|(entry, _)| entry.clone())
            .collect()
    }

    pub fn entry_count(&self) -> usize {
        self.inner.read().entries.len()
    }
}
