use bookingauthz_core::expression::ExpressionError;
use bookingauthz_core::{AclEntryId, AclObjectIdentity, ObjectClass, Role};
use bookingauthz_storage::StorageError;

use crate::provider::ProviderError;

#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthzError {
    #[error("user '{0}' does not exist")]
    UserNotFound(String),

    #[error("group '{0}' does not exist")]
    GroupNotFound(String),

    #[error("group '{0}' already exists")]
    GroupAlreadyExists(String),

    #[error("ACL entry {0} does not exist")]
    EntryNotFound(AclEntryId),

    #[error("ACL entry {entry_id} is referenced by a parent entry and cannot be deleted")]
    Referenced { entry_id: AclEntryId },

    #[error("role '{role}' is not allowed on {object}")]
    InvalidRole {
        object: AclObjectIdentity,
        role: Role,
    },

    #[error("object class '{0}' is not registered")]
    UnknownObjectClass(ObjectClass),

    #[error("a transaction is already active")]
    TransactionActive,

    #[error("no transaction is active")]
    NoTransaction,

    #[error("group everyone cannot be modified")]
    EveryoneGroupImmutable,

    #[error("expression error: {0}")]
    Expression(#[from] ExpressionError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("identity provider error: {0}")]
    Provider(String),
}

impl From<ProviderError> for AuthzError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::UserNotFound(id) => Self::UserNotFound(id),
            ProviderError::GroupNotFound(id) => Self::GroupNotFound(id),
            ProviderError::GroupAlreadyExists(name) => Self::GroupAlreadyExists(name),
            other => Self::Provider(other.to_string()),
        }
    }
}

impl AuthzError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::UserNotFound(_) | Self::GroupNotFound(_) | Self::EntryNotFound(_)
        )
    }
}
