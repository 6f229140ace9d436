pub mod audit;
pub mod authorization;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod graph;
pub mod manager;
pub mod provider;

pub use authorization::{
    AdministrationMode, Authorization, AuthorizationSettings, ObjectIdSet, SystemPermission,
};
pub use error::AuthzError;
pub use manager::{AuthorizationManager, DeleteOutcome};
