pub mod group;
pub mod permission;
pub mod refresh_token;
pub mod user;

pub use group::{Group, PUBLIC_GROUP_ID};
pub use permission::{PermissionRule, ANY_METHOD, FULL_ACCESS_ROLE};
pub use refresh_token::{NewRefreshToken, RefreshTokenRecord, TokenState};
pub use user::{LocalizedText, NewUser, User, UserInfo};
