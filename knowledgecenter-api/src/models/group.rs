use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{types::Json, FromRow};

use super::user::LocalizedText;

/// Group every registered user joins.
pub const PUBLIC_GROUP_ID: &str = "public";

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Group {
    #[serde(skip)]
    pub id: i64,
    pub public_id: String,
    pub name: Json<LocalizedText>,
    pub description: Json<LocalizedText>,
    pub created_at: DateTime<Utc>,
}
