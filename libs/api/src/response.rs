use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::Environment;

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Streams {
    pub success: bool,
    pub server: ServerInfo,
    pub live: BTreeMap<String, LiveStream>,
    pub streams: Vec<Session>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    pub version: String,
    pub environment: Environment,
    pub uptime_seconds: i64,
    pub sessions: u64,
    pub publishers: u64,
    pub viewers: u64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LiveStream {
    pub subscribers: u64,
    pub start_time: DateTime<Utc>,
    pub hls_url: String,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Connecting,
    Publishing,
    Playing,
    Ended,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionRole {
    Publisher,
    Viewer,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_key: Option<String>,
    pub role: SessionRole,
    pub state: SessionState,
    pub publish_active: bool,
    pub connected_at: DateTime<Utc>,
    pub viewers: u64,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct HlsStatus {
    pub success: bool,
    pub media_root: String,
    pub streams: Vec<ManifestStatus>,
    pub sessions: BTreeMap<String, HlsSession>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ManifestStatus {
    pub stream_key: String,
    pub manifest: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HlsSession {
    pub subscribers: u64,
    pub start_time: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RequeueReport {
    pub attempted: usize,
    pub delivered: usize,
    pub remaining: usize,
}

/// Reply of the application's webhook endpoints.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAck {
    pub success: bool,
    #[serde(default)]
    pub applied: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live_status: Option<LiveStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LiveStatus {
    #[default]
    Pending,
    Scheduled,
    Live,
    Ended,
    Failed,
    Cancelled,
}

impl LiveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LiveStatus::Pending => "pending",
            LiveStatus::Scheduled => "scheduled",
            LiveStatus::Live => "live",
            LiveStatus::Ended => "ended",
            LiveStatus::Failed => "failed",
            LiveStatus::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for LiveStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(LiveStatus::Pending),
            "scheduled" => Ok(LiveStatus::Scheduled),
            "live" => Ok(LiveStatus::Live),
            "ended" => Ok(LiveStatus::Ended),
            "failed" => Ok(LiveStatus::Failed),
            "cancelled" => Ok(LiveStatus::Cancelled),
            _ => Err(format!("unknown live status: {s}")),
        }
    }
}

/// Read model of a broadcast as exposed to the rest of the application.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Lifecycle {
    pub stream_key: String,
    pub title: Option<String>,
    pub live_status: LiveStatus,
    pub is_live: bool,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    pub viewer_count: i64,
    pub peak_viewer_count: i64,
    pub last_event_at: Option<DateTime<Utc>>,
    /// Session ids of the attached viewers, so replayed play/stop webhooks count once.
    #[serde(skip)]
    pub viewer_ids: BTreeSet<String>,
}
