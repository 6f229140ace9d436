mod object;
mod user;

pub use object::AclObjectState;
pub use user::AclUserState;
