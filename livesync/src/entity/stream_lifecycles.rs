use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Event timestamps are unix milliseconds.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "stream_lifecycles")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub stream_key: String,
    pub title: Option<String>,
    pub live_status: String, // pending, scheduled, live, ended, failed, cancelled
    pub is_live: bool,
    pub scheduled_at: Option<i64>,
    pub started_at: Option<i64>,
    pub ended_at: Option<i64>,
    pub duration_seconds: Option<i64>,
    pub viewer_count: i64,
    pub peak_viewer_count: i64,
    /// JSON array of attached viewer session ids.
    #[sea_orm(column_type = "Text")]
    pub viewer_ids: String,
    pub last_event_at: Option<i64>,
    /// Bumped on every write; updates are conditional on it.
    pub version: i64,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
