use std::{fmt, time::Duration};

use api::{
    event::{Environment, EventKind, WebhookPayload},
    UNKNOWN_STREAM_KEY, WEBHOOK_SECRET_HEADER,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::{
    store::{FailedWebhook, FailureStore},
    EventHook, OutboundWebhook,
};
use crate::{config::Config, metrics, session::Session};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivered {
    pub status: u16,
    pub attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFailure {
    ConnectionRefused,
    Timeout,
    Dns,
    Tls,
    Other,
}

impl fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransportFailure::ConnectionRefused => "connection refused",
            TransportFailure::Timeout => "timeout",
            TransportFailure::Dns => "dns",
            TransportFailure::Tls => "tls",
            TransportFailure::Other => "transport",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    NotConfigured,
    Transport {
        failure: TransportFailure,
        message: String,
    },
    Http {
        status: u16,
        body: String,
    },
}

impl fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryError::NotConfigured => f.write_str("webhook url not configured"),
            DeliveryError::Transport { failure, message } => write!(f, "{failure}: {message}"),
            DeliveryError::Http { status, body } => {
                let body: String = body.chars().take(200).collect();
                write!(f, "http {status}: {body}")
            }
        }
    }
}

impl std::error::Error for DeliveryError {}

/// Delay slept after the `attempt`-th failed attempt (1-based).
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(16);
    base.saturating_mul(1u32 << exp)
}

/// Walks the error source chain, the reqwest flags alone cannot tell dns from refused.
pub fn classify(err: &reqwest::Error) -> TransportFailure {
    if err.is_timeout() {
        return TransportFailure::Timeout;
    }
    let mut chain = err.to_string().to_lowercase();
    let mut source = std::error::Error::source(err);
    while let Some(inner) = source {
        chain.push(' ');
        chain.push_str(&inner.to_string().to_lowercase());
        source = inner.source();
    }
    if chain.contains("timed out") {
        TransportFailure::Timeout
    } else if chain.contains("dns") || chain.contains("resolve") || chain.contains("lookup") {
        TransportFailure::Dns
    } else if chain.contains("certificate") || chain.contains("tls") || chain.contains("ssl") {
        TransportFailure::Tls
    } else if err.is_connect() || chain.contains("refused") {
        TransportFailure::ConnectionRefused
    } else {
        TransportFailure::Other
    }
}

#[derive(Clone, Debug)]
pub struct WebHook {
    url: Option<String>,
    secret: String,
    app: String,
    environment: Environment,
    hls_url: String,
    rtmp_url: String,
    max_attempts: u32,
    backoff_base: Duration,
    client: Client,
    store: FailureStore,
}

impl WebHook {
    pub fn new(cfg: &Config, store: FailureStore) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(cfg.webhook.timeout())
            .timeout(cfg.webhook.timeout())
            .build()?;
        Ok(WebHook {
            url: cfg
                .webhook
                .url
                .as_ref()
                .map(|url| url.trim_end_matches('/').to_string()),
            secret: cfg.webhook.secret.clone(),
            app: cfg.app.clone(),
            environment: cfg.environment,
            hls_url: cfg.public.hls_url.trim_end_matches('/').to_string(),
            rtmp_url: cfg.public.rtmp_url.trim_end_matches('/').to_string(),
            max_attempts: cfg.webhook.max_attempts(cfg.environment).max(1),
            backoff_base: cfg.webhook.backoff_base(),
            client,
            store,
        })
    }

    pub fn store(&self) -> &FailureStore {
        &self.store
    }

    pub fn enabled(&self) -> bool {
        self.url.is_some()
    }

    pub fn endpoint(&self, kind: EventKind) -> Option<String> {
        self.url
            .as_ref()
            .map(|base| format!("{}{}", base, api::path::webhook_event(kind)))
    }

    pub fn payload(
        &self,
        kind: EventKind,
        stream_key: &str,
        session: &Session,
        extra: Option<serde_json::Value>,
        at: DateTime<Utc>,
    ) -> WebhookPayload {
        WebhookPayload {
            app: self.app.clone(),
            name: stream_key.to_string(),
            addr: session.source_addr.clone(),
            action: kind,
            stream_path: Some(format!("/{}/{}", self.app, stream_key)),
            id: Some(session.id.clone()),
            timestamp: at,
            secret: self.secret.clone(),
            hls_url: format!("{}{}", self.hls_url, api::path::live_manifest(stream_key)),
            rtmp_url: format!("{}/{}", self.rtmp_url, stream_key),
            environment: self.environment,
            extra,
        }
    }

    /// Never fails: exhausted deliveries end up in the failure store.
    pub async fn dispatch(
        &self,
        kind: EventKind,
        stream_key: &str,
        session: &Session,
        extra: Option<serde_json::Value>,
        at: DateTime<Utc>,
    ) -> Option<Delivered> {
        let stream_key = stream_key.trim();
        if stream_key.is_empty() || stream_key == UNKNOWN_STREAM_KEY {
            debug!(event = %kind, session = session.id, "skip webhook without stream key");
            return None;
        }
        if !self.enabled() {
            debug!(event = %kind, stream = stream_key, "webhook url not configured, skip");
            return None;
        }

        let payload = self.payload(kind, stream_key, session, extra, at);
        match self.deliver(&payload).await {
            Ok(delivered) => Some(delivered),
            Err(err) => {
                metrics::WEBHOOK_PERSISTED.inc();
                error!(
                    event = %kind,
                    stream = stream_key,
                    attempts = self.max_attempts,
                    error = %err,
                    "webhook delivery exhausted, persisting"
                );
                if let Err(e) = self
                    .store
                    .append(FailedWebhook::new(payload, err.to_string()))
                    .await
                {
                    error!(path = %self.store.path().display(), "persist failed webhook error: {:?}", e);
                }
                None
            }
        }
    }

    pub async fn deliver(&self, payload: &WebhookPayload) -> Result<Delivered, DeliveryError> {
        let mut attempt = 1;
        loop {
            match self.deliver_once(payload).await {
                Ok(delivered) => {
                    return Ok(Delivered {
                        attempts: attempt,
                        ..delivered
                    })
                }
                Err(DeliveryError::NotConfigured) => return Err(DeliveryError::NotConfigured),
                Err(err) if attempt >= self.max_attempts => return Err(err),
                Err(err) => {
                    let delay = backoff_delay(self.backoff_base, attempt);
                    warn!(
                        event = %payload.action,
                        stream = payload.name,
                        attempt,
                        max_attempts = self.max_attempts,
                        ?delay,
                        error = %err,
                        "webhook attempt failed"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// A single POST, used by the requeue worker as-is.
    pub async fn deliver_once(&self, payload: &WebhookPayload) -> Result<Delivered, DeliveryError> {
        let url = self
            .endpoint(payload.action)
            .ok_or(DeliveryError::NotConfigured)?;
        let result = self
            .client
            .post(&url)
            .header(WEBHOOK_SECRET_HEADER, &self.secret)
            .json(payload)
            .send()
            .await;
        match result {
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                if status.is_success() {
                    metrics::WEBHOOK_DELIVERED.inc();
                    debug!(url, ?status, res_body = body, "event webhook success");
                    Ok(Delivered {
                        status: status.as_u16(),
                        attempts: 1,
                    })
                } else {
                    metrics::WEBHOOK_FAILED.inc();
                    Err(DeliveryError::Http {
                        status: status.as_u16(),
                        body,
                    })
                }
            }
            Err(err) => {
                metrics::WEBHOOK_FAILED.inc();
                Err(DeliveryError::Transport {
                    failure: classify(&err),
                    message: err.to_string(),
                })
            }
        }
    }
}

#[async_trait]
impl EventHook for WebHook {
    async fn hook(&self, mut receiver: mpsc::Receiver<OutboundWebhook>) {
        while let Some(job) = receiver.recv().await {
            let _ = self
                .dispatch(job.kind, &job.stream_key, &job.session, job.extra, job.at)
                .await;
        }
        info!("outbound webhook queue drained");
    }
}

#[cfg(test)]
mod tests {
    use crate::session::Role;

    use super::*;

    fn hook(dir: &std::path::Path, url: Option<&str>) -> WebHook {
        let mut cfg = Config::default();
        cfg.environment = Environment::Development;
        cfg.webhook.url = url.map(str::to_string);
        cfg.webhook.secret = "s3cret".to_string();
        cfg.webhook.backoff_base.0 = 1;
        cfg.webhook.timeout.0 = 500;
        cfg.public.hls_url = "http://cdn.example.com/".to_string();
        cfg.public.rtmp_url = "rtmp://ingest.example.com/live".to_string();
        WebHook::new(&cfg, FailureStore::new(dir.join("failed.json"))).unwrap()
    }

    fn publisher() -> Session {
        let mut session = Session::new(Role::Publisher, "10.0.0.7:50000".to_string());
        session.stream_key = Some("smc_validkey123".to_string());
        session
    }

    #[test]
    fn test_backoff_delay() {
        let base = Duration::from_millis(1000);
        assert_eq!(Duration::from_millis(1000), backoff_delay(base, 1));
        assert_eq!(Duration::from_millis(2000), backoff_delay(base, 2));
        assert_eq!(Duration::from_millis(4000), backoff_delay(base, 3));
        assert_eq!(Duration::from_millis(8000), backoff_delay(base, 4));
        assert_eq!(Duration::from_millis(1000), backoff_delay(base, 0));
    }

    #[test]
    fn test_payload() {
        let dir = tempfile::tempdir().unwrap();
        let hook = hook(dir.path(), Some("http://app:3000/"));
        let session = publisher();
        let payload =
            hook.payload(EventKind::Publish, "smc_validkey123", &session, None, Utc::now());
        assert_eq!("live", payload.app);
        assert_eq!("smc_validkey123", payload.name);
        assert_eq!("10.0.0.7:50000", payload.addr);
        assert_eq!(Some("/live/smc_validkey123".to_string()), payload.stream_path);
        assert_eq!(Some(session.id.clone()), payload.id);
        assert_eq!(
            "http://cdn.example.com/live/smc_validkey123/index.m3u8",
            payload.hls_url
        );
        assert_eq!("rtmp://ingest.example.com/live/smc_validkey123", payload.rtmp_url);
        assert_eq!("s3cret", payload.secret);
        assert_eq!(
            Some("http://app:3000/webhooks/stream/publish".to_string()),
            hook.endpoint(EventKind::Publish)
        );
    }

    #[test]
    fn test_payload_reports_event_time() {
        let dir = tempfile::tempdir().unwrap();
        let hook = hook(dir.path(), Some("http://app:3000"));
        let mut session = publisher();
        let at = Utc::now() - chrono::Duration::seconds(60);
        session.published_at = Some(at);
        let payload = hook.payload(EventKind::Publish, "smc_validkey123", &session, None, at);
        assert_eq!(at, payload.timestamp);
    }

    #[tokio::test]
    async fn test_dead_key_is_suppressed() {
        let dir = tempfile::tempdir().unwrap();
        // Nothing listens on port 9; a network call would fail and be persisted.
        let hook = hook(dir.path(), Some("http://127.0.0.1:9"));
        let session = publisher();
        for key in ["", "   ", UNKNOWN_STREAM_KEY] {
            assert_eq!(None, hook.dispatch(EventKind::Publish, key, &session, None, Utc::now()).await);
        }
        assert!(hook.store().load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_without_url() {
        let dir = tempfile::tempdir().unwrap();
        let hook = hook(dir.path(), None);
        assert!(!hook.enabled());
        let session = publisher();
        assert_eq!(
            None,
            hook.dispatch(EventKind::Publish, "smc_validkey123", &session, None, Utc::now())
                .await
        );
        assert!(hook.store().load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_connection_refused_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let hook = hook(dir.path(), Some(format!("http://{addr}").as_str()));
        let session = publisher();
        assert_eq!(
            None,
            hook.dispatch(EventKind::Unpublish, "smc_validkey123", &session, None, Utc::now())
                .await
        );
        let records = hook.store().load_all().await.unwrap();
        assert_eq!(1, records.len());
        assert_eq!(EventKind::Unpublish, records[0].payload.action);
        assert_eq!(0, records[0].retry_count);
        assert!(records[0].error.starts_with("connection refused"), "{}", records[0].error);
    }

    #[test]
    fn test_error_display() {
        let err = DeliveryError::Http {
            status: 503,
            body: "x".repeat(500),
        };
        let text = err.to_string();
        assert!(text.starts_with("http 503: "));
        assert_eq!("http 503: ".len() + 200, text.len());
    }
}
