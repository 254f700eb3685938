use std::collections::BTreeMap;

use api::response::{HlsSession, HlsStatus, LiveStream, RequeueReport, ServerInfo, Streams};
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;

use crate::hook::store::FailedWebhook;
use crate::route::AppState;
use crate::{hls, metrics};

pub fn route() -> Router<AppState> {
    Router::new()
        .route(api::path::STREAMS, get(streams))
        .route(api::path::HLS_STATUS, get(hls_status))
        .route(api::path::FAILED_WEBHOOKS, get(failed_webhooks))
        .route(api::path::FAILED_WEBHOOKS_RETRY, post(retry_failed_webhooks))
        .route(api::path::METRICS, get(metrics_text))
}

async fn streams(State(state): State<AppState>) -> crate::result::Result<Json<Streams>> {
    let registry = state.manager.registry();
    let sessions = registry.snapshot().await;
    let counts = registry.counts().await;
    let hls_url = state.config.public.hls_url.trim_end_matches('/');

    let live = sessions
        .iter()
        .filter(|s| s.publish_active())
        .filter_map(|s| {
            let key = s.stream_key.clone()?;
            Some((
                key.clone(),
                LiveStream {
                    subscribers: s.viewer_connections.len() as u64,
                    start_time: s.published_at.unwrap_or(s.connected_at),
                    hls_url: format!("{}{}", hls_url, api::path::live_manifest(&key)),
                },
            ))
        })
        .collect();

    Ok(Json(Streams {
        success: true,
        server: ServerInfo {
            version: env!("CARGO_PKG_VERSION").to_string(),
            environment: state.config.environment,
            uptime_seconds: (Utc::now() - state.started_at).num_seconds(),
            sessions: counts.sessions,
            publishers: counts.publishers,
            viewers: counts.viewers,
        },
        live,
        streams: sessions.iter().map(|s| s.into()).collect(),
    }))
}

async fn hls_status(State(state): State<AppState>) -> crate::result::Result<Json<HlsStatus>> {
    let media_root = &state.config.hls.media_root;
    let streams = hls::probe(media_root, state.config.key_mode()).await;
    let sessions: BTreeMap<String, HlsSession> = state
        .manager
        .registry()
        .snapshot()
        .await
        .into_iter()
        .filter(|s| s.publish_active())
        .filter_map(|s| {
            Some((
                s.stream_key.clone()?,
                HlsSession {
                    subscribers: s.viewer_connections.len() as u64,
                    start_time: s.published_at.unwrap_or(s.connected_at),
                },
            ))
        })
        .collect();
    Ok(Json(HlsStatus {
        success: true,
        media_root: media_root.display().to_string(),
        streams,
        sessions,
    }))
}

async fn failed_webhooks(
    State(state): State<AppState>,
) -> crate::result::Result<Json<Vec<FailedWebhook>>> {
    Ok(Json(state.requeuer.hook().store().load_all().await?))
}

async fn retry_failed_webhooks(State(state): State<AppState>) -> Json<RequeueReport> {
    Json(state.requeuer.run_once().await)
}

async fn metrics_text() -> String {
    metrics::encode()
}
