use std::collections::HashSet;

use bookingauthz_core::{
    AclEntry, AclEntryDependency, AclEntryId, AclIdentity, AclObjectIdentity, Role,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("ACL entry for {identity} on {object} with role {role} already exists")]
    DuplicateEntry {
        identity: AclIdentity,
        object: AclObjectIdentity,
        role: Role,
    },
    #[error("ACL entry {0} not found")]
    EntryNotFound(AclEntryId),
    #[error("ACL dependency #{parent} -> #{child} already exists")]
    DuplicateDependency { parent: AclEntryId, child: AclEntryId },
    #[error("internal storage error: {0}")]
    Internal(String),
}

/// Persistent ACL entries and the dependency edges between them.
pub trait AclStore: Send + Sync {
    /// Fails with `DuplicateEntry` when the triple already exists.
    fn create_entry(
        &self,
        identity: &AclIdentity,
        object: &AclObjectIdentity,
        role: &Role,
    ) -> impl Future<Output = Result<AclEntry, StorageError>> + Send;

    /// Deletes the entry together with every dependency that references it.
    fn delete_entry(
        &self,
        entry: &AclEntry,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    fn get_entry(
        &self,
        entry_id: AclEntryId,
    ) -> impl Future<Output = Result<Option<AclEntry>, StorageError>> + Send;

    fn find_entry(
        &self,
        identity: &AclIdentity,
        object: &AclObjectIdentity,
        role: &Role,
    ) -> impl Future<Output = Result<Option<AclEntry>, StorageError>> + Send;

    fn list_entries_by_object(
        &self,
        object: &AclObjectIdentity,
    ) -> impl Future<Output = Result<Vec<AclEntry>, StorageError>> + Send;

    fn list_entries_by_identities(
        &self,
        identities: &HashSet<AclIdentity>,
    ) -> impl Future<Output = Result<Vec<AclEntry>, StorageError>> + Send;

    /// Fails with `DuplicateDependency` when the pair already exists.
    fn create_dependency(
        &self,
        dependency: &AclEntryDependency,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    fn find_dependency(
        &self,
        parent: AclEntryId,
        child: AclEntryId,
    ) -> impl Future<Output = Result<Option<AclEntryDependency>, StorageError>> + Send;

    fn list_dependencies_by_parent(
        &self,
        parent: AclEntryId,
    ) -> impl Future<Output = Result<Vec<AclEntryDependency>, StorageError>> + Send;

    fn list_dependencies_by_child(
        &self,
        child: AclEntryId,
    ) -> impl Future<Output = Result<Vec<AclEntryDependency>, StorageError>> + Send;

    /// Dependencies whose child entry is on `object`.
    fn list_dependencies_by_child_object(
        &self,
        object: &AclObjectIdentity,
    ) -> impl Future<Output = Result<Vec<AclEntryDependency>, StorageError>> + Send;

    /// Deleting a dependency that does not exist is a no-op.
    fn delete_dependency(
        &self,
        dependency: &AclEntryDependency,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;
}
