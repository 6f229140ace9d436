use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

use bookingauthz_core::{
    AclEntry, AclEntryDependency, AclEntryId, AclIdentity, AclObjectIdentity, Role,
};

use crate::traits::{AclStore, StorageError};

#[derive(Debug, Default)]
struct InnerState {
    last_id: u64,
    entries: BTreeMap<AclEntryId, AclEntry>,
    dependencies: Vec<AclEntryDependency>,
}

impl InnerState {
    fn find(
        &self,
        identity: &AclIdentity,
        object: &AclObjectIdentity,
        role: &Role,
    ) -> Option<&AclEntry> {
        self.entries
            .values()
            .find(|entry| entry.matches(identity, object, role))
    }

    fn dependencies_where(
        &self,
        predicate: impl Fn(&AclEntryDependency) -> bool,
    ) -> Vec<AclEntryDependency> {
        self.dependencies
            .iter()
            .filter(|dependency| predicate(dependency))
            .cloned()
            .collect()
    }
}

/// ACL store kept in process memory. Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAclStore {
    state: Arc<Mutex<InnerState>>,
}

impl InMemoryAclStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry_count(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn dependency_count(&self) -> usize {
        self.state.lock().dependencies.len()
    }
}

impl AclStore for InMemoryAclStore {
    async fn create_entry(
        &self,
        identity: &AclIdentity,
        object: &AclObjectIdentity,
        role: &Role,
    ) -> Result<AclEntry, StorageError> {
        let mut state = self.state.lock();
        if state.find(identity, object, role).is_some() {
            return Err(StorageError::DuplicateEntry {
                identity: identity.clone(),
                object: object.clone(),
                role: role.clone(),
            });
        }

        state.last_id += 1;
        let entry = AclEntry::new(
            AclEntryId::new(state.last_id),
            identity.clone(),
            object.clone(),
            role.clone(),
        );
        state.entries.insert(entry.id, entry.clone());
        tracing::debug!(target: "acl", entry = %entry, "stored ACL entry");
        Ok(entry)
    }

    async fn delete_entry(&self, entry: &AclEntry) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        if state.entries.remove(&entry.id).is_none() {
            return Err(StorageError::EntryNotFound(entry.id));
        }
        state.dependencies.retain(|dependency| {
            dependency.parent_entry_id != entry.id && dependency.child_entry_id != entry.id
        });
        Ok(())
    }

    async fn get_entry(&self, entry_id: AclEntryId) -> Result<Option<AclEntry>, StorageError> {
        Ok(self.state.lock().entries.get(&entry_id).cloned())
    }

    async fn find_entry(
        &self,
        identity: &AclIdentity,
        object: &AclObjectIdentity,
        role: &Role,
    ) -> Result<Option<AclEntry>, StorageError> {
        Ok(self.state.lock().find(identity, object, role).cloned())
    }

    async fn list_entries_by_object(
        &self,
        object: &AclObjectIdentity,
    ) -> Result<Vec<AclEntry>, StorageError> {
        let state = self.state.lock();
        Ok(state
            .entries
            .values()
            .filter(|entry| entry.object_identity == *object)
            .cloned()
            .collect())
    }

    async fn list_entries_by_identities(
        &self,
        identities: &HashSet<AclIdentity>,
    ) -> Result<Vec<AclEntry>, StorageError> {
        let state = self.state.lock();
        Ok(state
            .entries
            .values()
            .filter(|entry| identities.contains(&entry.identity))
            .cloned()
            .collect())
    }

    async fn create_dependency(&self, dependency: &AclEntryDependency) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        let exists = state.dependencies.iter().any(|existing| {
            existing.parent_entry_id == dependency.parent_entry_id
                && existing.child_entry_id == dependency.child_entry_id
        });
        if exists {
            return Err(StorageError::DuplicateDependency {
                parent: dependency.parent_entry_id,
                child: dependency.child_entry_id,
            });
        }
        for id in [dependency.parent_entry_id, dependency.child_entry_id] {
            if !state.entries.contains_key(&id) {
                return Err(StorageError::EntryNotFound(id));
            }
        }
        state.dependencies.push(dependency.clone());
        Ok(())
    }

    async fn find_dependency(
        &self,
        parent: AclEntryId,
        child: AclEntryId,
    ) -> Result<Option<AclEntryDependency>, StorageError> {
        let state = self.state.lock();
        Ok(state
            .dependencies
            .iter()
            .find(|d| d.parent_entry_id == parent && d.child_entry_id == child)
            .cloned())
    }

    async fn list_dependencies_by_parent(
        &self,
        parent: AclEntryId,
    ) -> Result<Vec<AclEntryDependency>, StorageError> {
        Ok(self
            .state
            .lock()
            .dependencies_where(|d| d.parent_entry_id == parent))
    }

    async fn list_dependencies_by_child(
        &self,
        child: AclEntryId,
    ) -> Result<Vec<AclEntryDependency>, StorageError> {
        Ok(self
            .state
            .lock()
            .dependencies_where(|d| d.child_entry_id == child))
    }

    async fn list_dependencies_by_child_object(
        &self,
        object: &AclObjectIdentity,
    ) -> Result<Vec<AclEntryDependency>, StorageError> {
        let state = self.state.lock();
        Ok(state.dependencies_where(|d| {
            state
                .entries
                .get(&d.child_entry_id)
                .is_some_and(|child| child.object_identity == *object)
        }))
    }

    async fn delete_dependency(&self, dependency: &AclEntryDependency) -> Result<(), StorageError> {
        self.state.lock().dependencies.retain(|existing| {
            existing.parent_entry_id != dependency.parent_entry_id
                || existing.child_entry_id != dependency.child_entry_id
        });
        Ok(())
    }
}
