pub mod auth;
pub mod rbac;

pub use auth::{authenticate, optional_authenticate, AuthContext, AuthUser};
pub use rbac::{authorize, require_roles, RoleRequirement};
