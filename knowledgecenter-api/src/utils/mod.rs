pub mod client_info;
pub mod cookies;
pub mod password;
pub mod random;
pub mod validation;

pub use client_info::ClientInfo;
pub use cookies::RefreshCookie;
pub use password::{hash_password, verify_password, Argon2Settings, Password, PasswordHashString};
pub use validation::ValidatedJson;
