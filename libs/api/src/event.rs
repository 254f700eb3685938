use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Connect,
    Disconnect,
    Publish,
    Unpublish,
    Play,
    Stop,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::Connect,
        EventKind::Disconnect,
        EventKind::Publish,
        EventKind::Unpublish,
        EventKind::Play,
        EventKind::Stop,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Connect => "connect",
            EventKind::Disconnect => "disconnect",
            EventKind::Publish => "publish",
            EventKind::Unpublish => "unpublish",
            EventKind::Play => "play",
            EventKind::Stop => "stop",
        }
    }

    /// connect/disconnect are informational and never carry lifecycle state.
    pub fn requires_stream_key(&self) -> bool {
        !matches!(self, EventKind::Connect | EventKind::Disconnect)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown webhook event: {s}"))
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Production,
    #[default]
    Development,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Production => f.write_str("production"),
            Environment::Development => f.write_str("development"),
        }
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Environment::Production),
            "development" | "dev" => Ok(Environment::Development),
            _ => Err(format!("unknown environment: {s}")),
        }
    }
}

/// Body of every gateway -> application webhook.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    #[serde(default)]
    pub app: String,
    /// The stream key.
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub addr: String,
    pub action: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub secret: String,
    #[serde(default)]
    pub hls_url: String,
    #[serde(default)]
    pub rtmp_url: String,
    #[serde(default)]
    pub environment: Environment,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_parse() {
        for kind in EventKind::ALL {
            assert_eq!(Ok(kind), kind.as_str().parse());
        }
        assert!("restart".parse::<EventKind>().is_err());
        assert!(!EventKind::Connect.requires_stream_key());
        assert!(EventKind::Unpublish.requires_stream_key());
    }

    #[test]
    fn test_payload_wire_names() {
        let payload = WebhookPayload {
            app: "live".to_string(),
            name: "smc_validkey123".to_string(),
            addr: "127.0.0.1:50000".to_string(),
            action: EventKind::Publish,
            stream_path: Some("/live/smc_validkey123".to_string()),
            id: Some("abc".to_string()),
            timestamp: Utc::now(),
            secret: "s3cret".to_string(),
            hls_url: "http://localhost:8080/live/smc_validkey123/index.m3u8".to_string(),
            rtmp_url: "rtmp://localhost:1935/live/smc_validkey123".to_string(),
            environment: Environment::Production,
            extra: None,
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!("publish", value["action"]);
        assert_eq!("production", value["environment"]);
        assert_eq!("/live/smc_validkey123", value["streamPath"]);
        assert!(value.get("hlsUrl").is_some());
        assert!(value.get("rtmpUrl").is_some());
        assert!(value.get("extra").is_none());
    }

    #[test]
    fn test_payload_lenient_decode() {
        let payload: WebhookPayload =
            serde_json::from_str(r#"{"action":"stop","name":"smc_abcdefgh"}"#).unwrap();
        assert_eq!(EventKind::Stop, payload.action);
        assert_eq!(Environment::Development, payload.environment);
        assert!(payload.id.is_none());
    }
}
