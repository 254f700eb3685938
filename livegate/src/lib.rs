use std::{
    future::{Future, IntoFuture},
    net::SocketAddr,
    sync::Arc,
};

use axum::{extract::Request, Router};
use chrono::Utc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, info_span, warn};

use crate::config::Config;
use crate::hook::{requeue::Requeuer, store::FailureStore, webhook::WebHook, EventHook};
use crate::route::AppState;
use crate::session::{manager::SessionManager, registry::Registry};

pub mod config;
pub mod hls;
pub mod hook;
pub mod key;
pub mod session;

mod error;
mod metrics;
mod result;
mod route;

/// One listener per public surface.
pub struct Listeners {
    pub ingest: TcpListener,
    pub hls: TcpListener,
    pub api: TcpListener,
}

impl Listeners {
    pub async fn bind(cfg: &Config) -> std::io::Result<Self> {
        Ok(Self {
            ingest: TcpListener::bind(cfg.http.ingest).await?,
            hls: TcpListener::bind(cfg.http.hls).await?,
            api: TcpListener::bind(cfg.http.api).await?,
        })
    }
}

pub async fn serve<F>(cfg: Config, listeners: Listeners, signal: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!(
        ingest = %listeners.ingest.local_addr()?,
        hls = %listeners.hls.local_addr()?,
        api = %listeners.api.local_addr()?,
        environment = %cfg.environment,
        "Server listening"
    );
    if cfg.webhook.url.is_none() {
        warn!("webhook.url not set, lifecycle webhooks are disabled");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let hook = Arc::new(WebHook::new(
        &cfg,
        FailureStore::new(cfg.webhook.failed_store.clone()),
    )?);
    let (outbound_tx, outbound_rx) = mpsc::channel(cfg.webhook.queue_capacity);
    let dispatcher = {
        let hook = hook.clone();
        tokio::spawn(async move { hook.hook(outbound_rx).await })
    };

    let manager = SessionManager::new(
        Registry::default(),
        outbound_tx,
        cfg.key_mode(),
        cfg.session.grace_period(),
    );
    let requeuer = Arc::new(Requeuer::new(hook));
    let background = [
        tokio::spawn(session::manager::monitor_tick(
            manager.clone(),
            cfg.session.monitor_interval(),
            shutdown_rx.clone(),
        )),
        tokio::spawn(hook::requeue::requeue_tick(
            requeuer.clone(),
            cfg.webhook.requeue_interval(),
            shutdown_rx.clone(),
        )),
    ];

    let app_state = AppState {
        config: cfg.clone(),
        manager,
        requeuer,
        started_at: Utc::now(),
    };
    let ingest_app = layered(route::ingest::route(), app_state.clone(), cfg.http.cors);
    let hls_app = layered(route::hls::route(), app_state.clone(), cfg.http.cors);
    let api_app = layered(route::status::route(), app_state.clone(), cfg.http.cors);
    drop(app_state);

    let stop = async move {
        signal.await;
        info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    };
    let Listeners {
        ingest: ingest_listener,
        hls: hls_listener,
        api: api_listener,
    } = listeners;
    let (_, ingest, hls, api) = tokio::join!(
        stop,
        axum::serve(
            ingest_listener,
            ingest_app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(stopped(shutdown_rx.clone()))
        .into_future(),
        axum::serve(hls_listener, hls_app)
            .with_graceful_shutdown(stopped(shutdown_rx.clone()))
            .into_future(),
        axum::serve(api_listener, api_app)
            .with_graceful_shutdown(stopped(shutdown_rx.clone()))
            .into_future(),
    );
    for (name, result) in [("ingest", ingest), ("hls", hls), ("api", api)] {
        if let Err(e) = result {
            error!(server = name, "Application error: {e}");
        }
    }

    for task in background {
        let _ = task.await;
    }
    // The last outbound sender is gone with the state, the dispatcher drains what is queued.
    match tokio::time::timeout(cfg.shutdown_timeout(), dispatcher).await {
        Ok(_) => info!("Webhook queue drained"),
        Err(_) => warn!("Shutdown timeout, pending webhooks dropped"),
    }
    Ok(())
}

pub fn metrics_register() -> anyhow::Result<()> {
    metrics::register()?;
    Ok(())
}

async fn stopped(mut shutdown: watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

fn layered(router: Router<AppState>, state: AppState, cors: bool) -> Router {
    router
        .with_state(state)
        .layer(if cors {
            CorsLayer::permissive()
        } else {
            CorsLayer::new()
        })
        .layer(axum::middleware::from_fn(http_log::print_request_response))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                let span = info_span!(
                    "http_request",
                    uri = ?request.uri(),
                    method = ?request.method(),
                    span_id = tracing::field::Empty,
                );
                span.record(
                    "span_id",
                    span.id().unwrap_or(tracing::Id::from_u64(42)).into_u64(),
                );
                span
            }),
        )
}
