use std::{env, fmt, net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use api::event::Environment;
use serde::{Deserialize, Serialize};

use crate::key::KeyMode;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_environment")]
    pub environment: Environment,
    #[serde(default = "default_app")]
    pub app: String,
    #[serde(default)]
    pub http: Http,
    #[serde(default)]
    pub public: Public,
    #[serde(default)]
    pub log: Log,
    #[serde(default)]
    pub webhook: Webhook,
    #[serde(default)]
    pub session: Session,
    #[serde(default)]
    pub hls: Hls,
    #[serde(default)]
    pub shutdown_timeout: ShutdownTimeout,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Http {
    #[serde(default = "default_ingest_listen")]
    pub ingest: SocketAddr,
    #[serde(default = "default_hls_listen")]
    pub hls: SocketAddr,
    #[serde(default = "default_api_listen")]
    pub api: SocketAddr,
    #[serde(default)]
    pub cors: bool,
}

/// Externally reachable base URLs advertised in webhook payloads.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Public {
    #[serde(default = "default_public_hls_url")]
    pub hls_url: String,
    #[serde(default = "default_public_rtmp_url")]
    pub rtmp_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Log {
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct Webhook {
    /// Base URL of the consuming application, e.g. `http://app:3000`.
    #[serde(default = "default_webhook_url")]
    pub url: Option<String>,
    #[serde(default = "default_webhook_secret")]
    pub secret: String,
    /// Delivery attempts per event. Unset picks 5 in production and 3 otherwise.
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub backoff_base: BackoffBase,
    #[serde(default)]
    pub timeout: WebhookTimeout,
    #[serde(default)]
    pub requeue_interval: RequeueInterval,
    #[serde(default = "default_failed_store")]
    pub failed_store: PathBuf,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Session {
    #[serde(default)]
    pub grace_period: GracePeriod,
    #[serde(default)]
    pub monitor_interval: MonitorInterval,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hls {
    #[serde(default = "default_media_root")]
    pub media_root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffBase(pub u64);

impl Default for BackoffBase {
    fn default() -> Self {
        BackoffBase(1000)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookTimeout(pub u64);

impl Default for WebhookTimeout {
    fn default() -> Self {
        WebhookTimeout(5000)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequeueInterval(pub u64);

impl Default for RequeueInterval {
    fn default() -> Self {
        RequeueInterval(60 * 1000)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GracePeriod(pub u64);

impl Default for GracePeriod {
    fn default() -> Self {
        GracePeriod(10 * 1000)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorInterval(pub u64);

impl Default for MonitorInterval {
    fn default() -> Self {
        MonitorInterval(30 * 1000)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownTimeout(pub u64);

impl Default for ShutdownTimeout {
    fn default() -> Self {
        ShutdownTimeout(10 * 1000)
    }
}

fn env_listen(var: &str, port: &str) -> SocketAddr {
    SocketAddr::from_str(&format!(
        "0.0.0.0:{}",
        env::var(var).unwrap_or(String::from(port))
    ))
    .expect("invalid listen address")
}

fn default_ingest_listen() -> SocketAddr {
    env_listen("INGEST_PORT", "1935")
}

fn default_hls_listen() -> SocketAddr {
    env_listen("HLS_PORT", "8080")
}

fn default_api_listen() -> SocketAddr {
    env_listen("API_PORT", "8000")
}

fn default_environment() -> Environment {
    env::var("ENVIRONMENT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or_default()
}

fn default_app() -> String {
    String::from("live")
}

fn default_public_hls_url() -> String {
    env::var("PUBLIC_HLS_URL").unwrap_or(String::from("http://localhost:8080"))
}

fn default_public_rtmp_url() -> String {
    env::var("PUBLIC_RTMP_URL").unwrap_or(String::from("rtmp://localhost:1935/live"))
}

fn default_webhook_url() -> Option<String> {
    env::var("WEBHOOK_URL").ok().filter(|v| !v.trim().is_empty())
}

fn default_webhook_secret() -> String {
    env::var("WEBHOOK_SECRET").unwrap_or_default()
}

fn default_failed_store() -> PathBuf {
    PathBuf::from("failed_webhooks.json")
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_media_root() -> PathBuf {
    PathBuf::from(env::var("MEDIA_ROOT").unwrap_or(String::from("media")))
}

fn default_log_level() -> String {
    env::var("LOG_LEVEL").unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            "debug".to_string()
        } else {
            "info".to_string()
        }
    })
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            app: default_app(),
            http: Default::default(),
            public: Default::default(),
            log: Default::default(),
            webhook: Default::default(),
            session: Default::default(),
            hls: Default::default(),
            shutdown_timeout: Default::default(),
        }
    }
}

impl Default for Http {
    fn default() -> Self {
        Self {
            ingest: default_ingest_listen(),
            hls: default_hls_listen(),
            api: default_api_listen(),
            cors: Default::default(),
        }
    }
}

impl Default for Public {
    fn default() -> Self {
        Self {
            hls_url: default_public_hls_url(),
            rtmp_url: default_public_rtmp_url(),
        }
    }
}

impl Default for Log {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for Webhook {
    fn default() -> Self {
        Self {
            url: default_webhook_url(),
            secret: default_webhook_secret(),
            max_attempts: None,
            backoff_base: Default::default(),
            timeout: Default::default(),
            requeue_interval: Default::default(),
            failed_store: default_failed_store(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl Default for Hls {
    fn default() -> Self {
        Self {
            media_root: default_media_root(),
        }
    }
}

impl fmt::Debug for Webhook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Webhook")
            .field("url", &self.url)
            .field("secret", &redacted(&self.secret))
            .field("max_attempts", &self.max_attempts)
            .field("backoff_base", &self.backoff_base)
            .field("timeout", &self.timeout)
            .field("requeue_interval", &self.requeue_interval)
            .field("failed_store", &self.failed_store)
            .field("queue_capacity", &self.queue_capacity)
            .finish()
    }
}

fn redacted(secret: &str) -> &'static str {
    if secret.is_empty() {
        ""
    } else {
        "***"
    }
}

impl Webhook {
    pub fn max_attempts(&self, environment: Environment) -> u32 {
        match self.max_attempts {
            Some(attempts) => attempts,
            None if environment.is_production() => 5,
            None => 3,
        }
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base.0)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout.0)
    }

    pub fn requeue_interval(&self) -> Duration {
        Duration::from_millis(self.requeue_interval.0)
    }
}

impl Session {
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period.0)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval.0)
    }
}

impl Config {
    pub fn key_mode(&self) -> KeyMode {
        KeyMode::from(self.environment)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout.0)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(0) = self.webhook.max_attempts {
            anyhow::bail!("webhook.max_attempts must be at least 1");
        }
        if self.webhook.queue_capacity == 0 {
            anyhow::bail!("webhook.queue_capacity must be at least 1");
        }
        if self.webhook.requeue_interval.0 == 0 || self.session.monitor_interval.0 == 0 {
            anyhow::bail!("periodic task intervals must be greater than zero");
        }
        if let Some(url) = &self.webhook.url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("webhook.url must be an http(s) URL: {}", url);
            }
        }
        if self.environment.is_production() && self.webhook.secret.is_empty() {
            anyhow::bail!("webhook.secret is required in production");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_attempts_by_environment() {
        let webhook = Webhook::default();
        assert_eq!(5, webhook.max_attempts(Environment::Production));
        assert_eq!(3, webhook.max_attempts(Environment::Development));

        let webhook = Webhook {
            max_attempts: Some(7),
            ..Default::default()
        };
        assert_eq!(7, webhook.max_attempts(Environment::Development));
    }

    #[test]
    fn test_debug_hides_secret() {
        let cfg = Config {
            webhook: Webhook {
                secret: "s3cret-token".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        let text = format!("{:?}", cfg);
        assert!(!text.contains("s3cret-token"), "{text}");
        assert!(text.contains("secret: \"***\""), "{text}");
    }

    #[test]
    fn test_validate() {
        let cfg: Config = toml::from_str(
            r#"
environment = "development"

[webhook]
url = "http://127.0.0.1:3000"
max_attempts = 2
backoff_base = 50
"#,
        )
        .unwrap();
        assert!(cfg.validate().is_ok());
        assert_eq!(Duration::from_millis(50), cfg.webhook.backoff_base());

        let cfg: Config = toml::from_str(
            r#"
environment = "production"
[webhook]
secret = ""
"#,
        )
        .unwrap();
        assert!(cfg.validate().is_err());

        let cfg: Config = toml::from_str(
            r#"
[webhook]
url = "ftp://example.com"
"#,
        )
        .unwrap();
        assert!(cfg.validate().is_err());
    }
}
