mod registry;
pub mod types;

pub use registry::{ObjectTypeRegistry, RegistryError, booking_types};
pub use types::{ObjectClass, ObjectTypeDef, Permission, PropagationRule, Role, RolePropagation};
