//! Services layer: credentials, tokens, sessions and the permission table.

pub mod error;
pub mod jwt;
pub mod permissions;
pub mod session;
pub mod store;
pub mod tokens;
pub mod vault;

pub use error::ServiceError;
pub use jwt::{AccessToken, AccessTokenClaims, JwtService};
pub use permissions::{Decision, PermissionTable, UnlistedRoutePolicy};
pub use session::{Profile, Session, SessionService};
pub use store::{IdentityStore, MemoryIdentityStore, PgIdentityStore, StoreError};
pub use tokens::{IssuedTokens, TokenAuthority};
pub use vault::CredentialVault;
