//! Application and api-key models.
//!
//! An application is a named principal that owns tasks and api keys. Both
//! carry lifecycle flags; a row participates in authentication only while
//! `is_active` and not `is_deleted`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(FromRow, Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub id: i64,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub version: i32,
    pub is_active: bool,
    pub is_deleted: bool,
    pub activated: Option<DateTime<Utc>>,
    pub deactivated: Option<DateTime<Utc>>,
    pub deleted: Option<DateTime<Utc>>,
    pub undeleted: Option<DateTime<Utc>>,
    pub name: String,
}

/// A 40-character credential token binding a caller to an application.
#[derive(FromRow, Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: i64,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub version: i32,
    pub is_active: bool,
    pub is_deleted: bool,
    pub activated: Option<DateTime<Utc>>,
    pub deactivated: Option<DateTime<Utc>>,
    pub deleted: Option<DateTime<Utc>>,
    pub undeleted: Option<DateTime<Utc>>,
    pub app_id: i64,
    pub value: String,
}
