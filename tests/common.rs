#![allow(dead_code)]

use std::collections::HashSet;
use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use api::event::{Environment, EventKind, WebhookPayload};
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use http::{HeaderMap, StatusCode};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub const SECRET: &str = "s3cret";

/// Fake application endpoint that records every webhook it receives.
#[derive(Clone, Default)]
pub struct Recorder {
    calls: Arc<Mutex<Vec<(Instant, WebhookPayload, Option<String>)>>>,
    failing: Arc<Mutex<HashSet<String>>>,
}

impl Recorder {
    /// Webhooks for `stream_key` answer 500 from now on.
    pub fn fail(&self, stream_key: &str) {
        self.failing.lock().unwrap().insert(stream_key.to_string());
    }

    pub fn calls(&self) -> Vec<(Instant, WebhookPayload)> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(at, payload, _)| (*at, payload.clone()))
            .collect()
    }

    pub fn actions(&self) -> Vec<EventKind> {
        self.calls().into_iter().map(|(_, p)| p.action).collect()
    }

    pub fn secrets(&self) -> Vec<Option<String>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, _, secret)| secret.clone())
            .collect()
    }
}

async fn record(
    State(recorder): State<Recorder>,
    headers: HeaderMap,
    Json(payload): Json<WebhookPayload>,
) -> StatusCode {
    let secret = headers
        .get(api::WEBHOOK_SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let failing = recorder.failing.lock().unwrap().contains(&payload.name);
    recorder
        .calls
        .lock()
        .unwrap()
        .push((Instant::now(), payload, secret));
    if failing {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    }
}

pub async fn start_recorder(recorder: Recorder) -> SocketAddr {
    let app = Router::new()
        .route(&api::path::webhook("{event}"), post(record))
        .with_state(recorder);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(axum::serve(listener, app).into_future());
    addr
}

pub fn gateway_config(dir: &Path, webhook: Option<SocketAddr>) -> livegate::config::Config {
    let mut cfg = livegate::config::Config::default();
    cfg.environment = Environment::Production;
    cfg.webhook.url = webhook.map(|addr| format!("http://{addr}"));
    cfg.webhook.secret = SECRET.to_string();
    cfg.webhook.max_attempts = Some(3);
    cfg.webhook.backoff_base = livegate::config::BackoffBase(50);
    cfg.webhook.timeout = livegate::config::WebhookTimeout(1000);
    cfg.webhook.failed_store = dir.join("failed_webhooks.json");
    cfg.session.grace_period = livegate::config::GracePeriod(100);
    cfg.hls.media_root = dir.join("media");
    cfg.public.hls_url = "http://cdn.example.com".to_string();
    cfg
}

pub struct Gateway {
    pub ingest: SocketAddr,
    pub hls: SocketAddr,
    pub api: SocketAddr,
    stop: oneshot::Sender<()>,
    handle: JoinHandle<anyhow::Result<()>>,
}

impl Gateway {
    pub fn ingest_url(&self, path: &str) -> String {
        format!("http://{}{}", self.ingest, path)
    }

    pub fn hls_url(&self, path: &str) -> String {
        format!("http://{}{}", self.hls, path)
    }

    pub fn api_url(&self, path: &str) -> String {
        format!("http://{}{}", self.api, path)
    }

    pub async fn shutdown(self) -> anyhow::Result<()> {
        let _ = self.stop.send(());
        tokio::time::timeout(Duration::from_secs(15), self.handle)
            .await
            .expect("gateway did not stop")
            .expect("gateway task panicked")
    }
}

async fn bind() -> TcpListener {
    TcpListener::bind("127.0.0.1:0").await.unwrap()
}

pub async fn start_gateway(cfg: livegate::config::Config) -> Gateway {
    let listeners = livegate::Listeners {
        ingest: bind().await,
        hls: bind().await,
        api: bind().await,
    };
    let ingest = listeners.ingest.local_addr().unwrap();
    let hls = listeners.hls.local_addr().unwrap();
    let api = listeners.api.local_addr().unwrap();
    let (stop, stopped) = oneshot::channel::<()>();
    let handle = tokio::spawn(livegate::serve(cfg, listeners, async move {
        let _ = stopped.await;
    }));
    Gateway {
        ingest,
        hls,
        api,
        stop,
        handle,
    }
}

pub fn sync_config(gateway: Option<SocketAddr>) -> livesync::config::Config {
    let mut cfg = livesync::config::Config::default();
    cfg.database.url = "sqlite::memory:".to_string();
    cfg.database.max_connections = 1;
    cfg.webhook.secret = SECRET.to_string();
    cfg.reconcile.gateway_url = gateway.map(|addr| format!("http://{addr}"));
    cfg
}

/// Starts livesync and waits until it answers.
pub async fn start_sync(cfg: livesync::config::Config) -> SocketAddr {
    let listener = bind().await;
    let addr = listener.local_addr().unwrap();
    tokio::spawn(livesync::serve(cfg, listener, std::future::pending()));
    let ready = eventually(Duration::from_secs(5), || async move {
        reqwest::get(format!("http://{addr}{}", api::path::LIFECYCLES))
            .await
            .map(|res| res.status().is_success())
            .unwrap_or(false)
    })
    .await;
    assert!(ready, "livesync did not come up");
    addr
}

/// Polls `check` every 20ms until it holds or `timeout` passes.
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
