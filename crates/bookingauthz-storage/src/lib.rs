pub mod memory;
pub mod traits;

pub use memory::InMemoryAclStore;
pub use traits::{AclStore, StorageError};
