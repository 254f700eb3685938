use std::future::Future;
use std::time::Duration;

use axum::{extract::Request, Router};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, info_span};

use crate::config::Config;
use crate::route::AppState;
use crate::service::database::DatabaseService;

pub mod config;
pub mod lifecycle;
pub mod service;

mod entity;
mod error;
mod migration;
mod result;
mod route;
mod tick;

pub async fn serve<F>(cfg: Config, listener: TcpListener, signal: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!("Server listening on {}", listener.local_addr()?);
    let database = DatabaseService::new(&cfg.database).await?;
    let app_state = AppState {
        config: cfg.clone(),
        database,
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reconcile = match cfg.reconcile.gateway_url.clone() {
        Some(gateway_url) => {
            let client = reqwest::Client::builder()
                .connect_timeout(Duration::from_millis(500))
                .timeout(Duration::from_millis(2000))
                .build()?;
            Some(tokio::spawn(tick::reconcile_check(
                app_state.clone(),
                client,
                gateway_url,
                shutdown_rx.clone(),
            )))
        }
        None => {
            info!("reconcile.gateway_url not set, reconciling disabled");
            None
        }
    };

    let app = Router::new()
        .merge(route::webhook::route())
        .merge(route::lifecycle::route())
        .with_state(app_state)
        .layer(if cfg.http.cors {
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
        );

    axum::serve(listener, app)
        .with_graceful_shutdown(signal)
        .await
        .unwrap_or_else(|e| error!("Application error: {e}"));

    let _ = shutdown_tx.send(true);
    if let Some(task) = reconcile {
        let _ = task.await;
    }
    Ok(())
}
