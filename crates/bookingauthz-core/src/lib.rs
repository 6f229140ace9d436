pub mod acl;
pub mod expression;
pub mod object_type;
pub mod state;
pub mod user_id_set;

pub use acl::{
    AclEntry, AclEntryDependency, AclEntryId, AclIdentity, AclIdentityType, AclObjectIdentity,
    DependencyKind,
};
pub use object_type::{ObjectClass, ObjectTypeRegistry, Permission, Role};
pub use user_id_set::UserIdSet;
