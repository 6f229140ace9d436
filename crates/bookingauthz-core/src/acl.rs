use std::fmt;

use serde::{Deserialize, Serialize};

use crate::object_type::{ObjectClass, Role};

/// Id of the group every principal belongs to.
pub const EVERYONE_GROUP_ID: &str = "0";
pub const EVERYONE_GROUP_NAME: &str = "everyone";
/// Id of the built-in root user, which holds every permission and never
/// receives ACL entries.
pub const ROOT_USER_ID: &str = "0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AclIdentityType {
    User,
    Group,
}

impl fmt::Display for AclIdentityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => f.write_str("user"),
            Self::Group => f.write_str("group"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AclIdentity {
    pub kind: AclIdentityType,
    pub principal_id: String,
}

impl AclIdentity {
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            kind: AclIdentityType::User,
            principal_id: user_id.into(),
        }
    }

    pub fn group(group_id: impl Into<String>) -> Self {
        Self {
            kind: AclIdentityType::Group,
            principal_id: group_id.into(),
        }
    }

    pub fn everyone() -> Self {
        Self::group(EVERYONE_GROUP_ID)
    }

    pub fn is_everyone(&self) -> bool {
        self.kind == AclIdentityType::Group && self.principal_id == EVERYONE_GROUP_ID
    }

    pub fn is_root(&self) -> bool {
        self.kind == AclIdentityType::User && self.principal_id == ROOT_USER_ID
    }
}

impl fmt::Display for AclIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.principal_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AclObjectIdentity {
    pub object_class: ObjectClass,
    pub object_id: i64,
}

impl AclObjectIdentity {
    pub fn new(object_class: impl Into<ObjectClass>, object_id: i64) -> Self {
        Self {
            object_class: object_class.into(),
            object_id,
        }
    }
}

impl fmt::Display for AclObjectIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.object_class, self.object_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AclEntryId(u64);

impl AclEntryId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for AclEntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Grants `role` on an object to an identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AclEntry {
    pub id: AclEntryId,
    pub identity: AclIdentity,
    pub object_identity: AclObjectIdentity,
    pub role: Role,
}

impl AclEntry {
    pub fn new(
        id: AclEntryId,
        identity: AclIdentity,
        object_identity: AclObjectIdentity,
        role: Role,
    ) -> Self {
        Self {
            id,
            identity,
            object_identity,
            role,
        }
    }

    pub fn matches(&self, identity: &AclIdentity, object: &AclObjectIdentity, role: &Role) -> bool {
        self.identity == *identity && self.object_identity == *object && self.role == *role
    }
}

impl fmt::Display for AclEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} {}#{}",
            self.id, self.identity, self.object_identity, self.role
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    /// Deleting the parent entry always deletes the child entry.
    Cascade,
    /// The child entry survives when the parent is deleted with detaching.
    Detach,
}

impl fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cascade => f.write_str("cascade"),
            Self::Detach => f.write_str("detach"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AclEntryDependency {
    pub parent_entry_id: AclEntryId,
    pub child_entry_id: AclEntryId,
    pub kind: DependencyKind,
}

impl AclEntryDependency {
    pub fn new(parent: AclEntryId, child: AclEntryId, kind: DependencyKind) -> Self {
        Self {
            parent_entry_id: parent,
            child_entry_id: child,
            kind,
        }
    }
}

impl fmt::Display for AclEntryDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} -> #{} ({})",
            self.parent_entry_id, self.child_entry_id, self.kind
        )
    }
}
