use api::{
    event::{EventKind, WebhookPayload},
    response::WebhookAck,
    WEBHOOK_SECRET_HEADER,
};
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use http::HeaderMap;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::route::AppState;
use crate::service::stream_lifecycles::{EventResult, StreamLifecyclesService};

pub fn route() -> Router<AppState> {
    Router::new().route(&api::path::webhook("{event}"), post(stream_event))
}

fn rejected(message: String) -> Json<WebhookAck> {
    warn!("{}", message);
    Json(WebhookAck {
        success: false,
        message: Some(message),
        ..Default::default()
    })
}

/// Header first, then the `secret` field of the body.
fn authorized(secret: &str, headers: &HeaderMap, body: &[u8]) -> bool {
    if secret.is_empty() {
        return true;
    }
    if let Some(value) = headers.get(WEBHOOK_SECRET_HEADER) {
        if value.as_bytes() == secret.as_bytes() {
            return true;
        }
    }
    serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("secret").and_then(|s| s.as_str()).map(|s| s == secret))
        .unwrap_or(false)
}

async fn stream_event(
    State(state): State<AppState>,
    Path(event): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> crate::result::Result<Json<WebhookAck>> {
    if !authorized(&state.config.webhook.secret, &headers, &body) {
        warn!(event, "webhook secret mismatch");
        return Err(AppError::Unauthorized);
    }
    let kind: EventKind = match event.parse() {
        Ok(kind) => kind,
        Err(e) => return Ok(rejected(e)),
    };
    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => return Ok(rejected(format!("invalid {kind} payload: {e}"))),
    };
    if payload.action != kind {
        return Ok(rejected(format!(
            "action {} does not match endpoint {}",
            payload.action, kind
        )));
    }
    if !kind.requires_stream_key() {
        info!(event = %kind, stream = payload.name, addr = payload.addr, id = ?payload.id, "connection event");
        return Ok(Json(WebhookAck {
            success: true,
            ..Default::default()
        }));
    }

    let stream_key = payload.name.trim();
    let result = StreamLifecyclesService::apply_event(
        state.database.get_connection(),
        stream_key,
        kind,
        payload.timestamp,
        payload.id.as_deref(),
    )
    .await?;
    let ack = match result {
        EventResult::Unknown => {
            debug!(event = %kind, stream = stream_key, "no lifecycle for stream");
            WebhookAck {
                success: true,
                applied: false,
                live_status: None,
                message: Some("unknown stream".to_string()),
            }
        }
        EventResult::Unchanged(current, reason) => {
            info!(event = %kind, stream = stream_key, reason, "webhook ignored");
            WebhookAck {
                success: true,
                applied: false,
                live_status: Some(current.live_status),
                message: Some(reason.to_string()),
            }
        }
        EventResult::Applied(next) => {
            info!(
                event = %kind,
                stream = stream_key,
                status = next.live_status.as_str(),
                viewers = next.viewer_count,
                "lifecycle updated"
            );
            WebhookAck {
                success: true,
                applied: true,
                live_status: Some(next.live_status),
                message: None,
            }
        }
    };
    Ok(Json(ack))
}
