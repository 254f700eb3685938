use std::{env, fmt, net::SocketAddr, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub http: Http,
    #[serde(default)]
    pub log: Log,
    #[serde(default)]
    pub database: Database,
    #[serde(default)]
    pub webhook: Webhook,
    #[serde(default)]
    pub reconcile: Reconcile,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Http {
    #[serde(default = "default_http_listen")]
    pub listen: SocketAddr,
    #[serde(default)]
    pub cors: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Log {
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Database {
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
    /// Seconds a pooled connection may sit unused. `0` keeps idle connections forever.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: u64,
    /// Seconds before a pooled connection is recycled. `0` never recycles.
    #[serde(default = "default_max_lifetime")]
    pub max_lifetime: u64,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct Webhook {
    /// Shared secret expected in `X-Webhook-Secret`. Empty accepts every request.
    #[serde(default = "default_webhook_secret")]
    pub secret: String,
}

/// Marks lifecycles `failed` when the gateway lost them without an unpublish.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reconcile {
    /// Gateway status API base, e.g. `http://gateway:8000`. Unset disables reconciling.
    #[serde(default = "default_gateway_url")]
    pub gateway_url: Option<String>,
    #[serde(default)]
    pub interval: ReconcileInterval,
    #[serde(default)]
    pub stale_after: StaleAfter,
    #[serde(default)]
    pub manifest_fresh: ManifestFresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileInterval(pub u64);

impl Default for ReconcileInterval {
    fn default() -> Self {
        ReconcileInterval(30 * 1000)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaleAfter(pub u64);

impl Default for StaleAfter {
    fn default() -> Self {
        StaleAfter(2 * 60 * 1000)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestFresh(pub u64);

impl Default for ManifestFresh {
    fn default() -> Self {
        ManifestFresh(30 * 1000)
    }
}

fn default_http_listen() -> SocketAddr {
    SocketAddr::from_str(&format!(
        "0.0.0.0:{}",
        env::var("PORT").unwrap_or(String::from("3000"))
    ))
    .expect("invalid listen address")
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

fn default_database_url() -> String {
    env::var("DATABASE_URL").unwrap_or(String::from("sqlite://livesync.db?mode=rwc"))
}

fn default_max_connections() -> u32 {
    10
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_idle_timeout() -> u64 {
    10 * 60
}

fn default_max_lifetime() -> u64 {
    60 * 60
}

fn default_webhook_secret() -> String {
    env::var("WEBHOOK_SECRET").unwrap_or_default()
}

fn default_gateway_url() -> Option<String> {
    env::var("GATEWAY_URL").ok().filter(|v| !v.trim().is_empty())
}

impl Default for Http {
    fn default() -> Self {
        Self {
            listen: default_http_listen(),
            cors: Default::default(),
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

impl Default for Database {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            connect_timeout: default_connect_timeout(),
            idle_timeout: default_idle_timeout(),
            max_lifetime: default_max_lifetime(),
        }
    }
}

fn seconds(value: u64) -> Option<Duration> {
    (value > 0).then(|| Duration::from_secs(value))
}

impl Database {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        seconds(self.idle_timeout)
    }

    pub fn max_lifetime(&self) -> Option<Duration> {
        seconds(self.max_lifetime)
    }
}

impl Default for Webhook {
    fn default() -> Self {
        Self {
            secret: default_webhook_secret(),
        }
    }
}

impl fmt::Debug for Webhook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secret = if self.secret.is_empty() { "" } else { "***" };
        f.debug_struct("Webhook").field("secret", &secret).finish()
    }
}

impl Default for Reconcile {
    fn default() -> Self {
        Self {
            gateway_url: default_gateway_url(),
            interval: Default::default(),
            stale_after: Default::default(),
            manifest_fresh: Default::default(),
        }
    }
}

impl Reconcile {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval.0)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_millis(self.stale_after.0)
    }

    pub fn manifest_fresh(&self) -> Duration {
        Duration::from_millis(self.manifest_fresh.0)
    }
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database.max_connections == 0 {
            anyhow::bail!("database.max_connections must be at least 1");
        }
        if self.reconcile.interval.0 == 0 {
            anyhow::bail!("reconcile.interval must be greater than zero");
        }
        if let Some(url) = &self.reconcile.gateway_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("reconcile.gateway_url must be an http(s) URL: {}", url);
            }
        }
        Ok(())
    }
}
