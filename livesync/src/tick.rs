use std::collections::HashSet;
use std::time::Duration;

use anyhow::Result;
use api::response::{HlsStatus, LiveStatus, Streams};
use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, error, warn};

use crate::route::AppState;
use crate::service::stream_lifecycles::{EventResult, StreamLifecyclesService};

/// Periodically compares `live` lifecycles with what the gateway reports.
pub async fn reconcile_check(
    state: AppState,
    client: reqwest::Client,
    gateway_url: String,
    mut shutdown: watch::Receiver<bool>,
) {
    let interval = state.config.reconcile.interval();
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.wait_for(|stop| *stop) => break,
        }
        match do_reconcile_check(&state, &client, &gateway_url).await {
            Ok(0) => {}
            Ok(failed) => warn!(failed, "lifecycles marked failed"),
            Err(e) => error!("reconcile check error: {:?}", e),
        }
    }
    debug!("reconcile check stopped");
}

/// Returns how many lifecycles were marked failed. A gateway that cannot be reached marks
/// nothing.
pub async fn do_reconcile_check(
    state: &AppState,
    client: &reqwest::Client,
    gateway_url: &str,
) -> Result<usize> {
    let db = state.database.get_connection();
    let live = StreamLifecyclesService::list_by_status(db, LiveStatus::Live).await?;
    if live.is_empty() {
        return Ok(0);
    }

    let base = gateway_url.trim_end_matches('/');
    let streams: Streams = client
        .get(format!("{}{}", base, api::path::STREAMS))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    let hls: HlsStatus = client
        .get(format!("{}{}", base, api::path::HLS_STATUS))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    let now = Utc::now();
    let manifest_fresh = chrono::Duration::from_std(state.config.reconcile.manifest_fresh())?;
    let stale_after = chrono::Duration::from_std(state.config.reconcile.stale_after())?;

    let publishing: HashSet<&str> = streams.live.keys().map(String::as_str).collect();
    let fresh_manifests: HashSet<&str> = hls
        .streams
        .iter()
        .filter(|s| s.manifest)
        .filter(|s| s.last_modified.is_some_and(|at| now - at <= manifest_fresh))
        .map(|s| s.stream_key.as_str())
        .collect();

    let mut failed = 0;
    for lifecycle in live {
        let key = lifecycle.stream_key.as_str();
        if publishing.contains(key) || fresh_manifests.contains(key) {
            continue;
        }
        let last_seen = lifecycle.last_event_at.or(lifecycle.started_at);
        if last_seen.is_some_and(|at| now - at < stale_after) {
            continue;
        }
        match StreamLifecyclesService::mark_failed(db, key, now).await? {
            EventResult::Applied(_) => {
                warn!(stream = key, ?last_seen, "gateway lost live stream, marked failed");
                failed += 1;
            }
            EventResult::Unchanged(_, reason) => debug!(stream = key, reason, "not marked failed"),
            EventResult::Unknown => {}
        }
    }
    Ok(failed)
}
