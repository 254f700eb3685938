use std::{sync::Arc, time::Duration};

use api::response::RequeueReport;
use chrono::Utc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info};

use super::{store::FailedWebhook, webhook::WebHook};

/// Replays persisted webhooks. A record appended between `load_all` and `overwrite` of one
/// pass is lost; the store is best effort.
#[derive(Debug)]
pub struct Requeuer {
    hook: Arc<WebHook>,
    running: Mutex<()>,
}

impl Requeuer {
    pub fn new(hook: Arc<WebHook>) -> Self {
        Self {
            hook,
            running: Mutex::new(()),
        }
    }

    pub fn hook(&self) -> &WebHook {
        &self.hook
    }

    pub async fn run_once(&self) -> RequeueReport {
        let _pass = self.running.lock().await;
        let store = self.hook.store();
        let records = match store.load_all().await {
            Ok(records) => records,
            Err(e) => {
                error!(path = %store.path().display(), "load failed webhooks error: {:?}", e);
                return RequeueReport::default();
            }
        };
        if records.is_empty() {
            return RequeueReport::default();
        }

        let attempted = records.len();
        let mut remaining: Vec<FailedWebhook> = Vec::new();
        for mut record in records {
            match self.hook.deliver_once(&record.payload).await {
                Ok(_) => {
                    debug!(
                        event = %record.payload.action,
                        stream = record.payload.name,
                        "requeued webhook delivered"
                    );
                }
                Err(err) => {
                    record.retry_count += 1;
                    record.error = err.to_string();
                    record.failed_at = Utc::now();
                    remaining.push(record);
                }
            }
        }

        if let Err(e) = store.overwrite(&remaining).await {
            error!(path = %store.path().display(), "overwrite failed webhooks error: {:?}", e);
        }
        let report = RequeueReport {
            attempted,
            delivered: attempted - remaining.len(),
            remaining: remaining.len(),
        };
        info!(
            attempted = report.attempted,
            delivered = report.delivered,
            remaining = report.remaining,
            "webhook requeue pass"
        );
        report
    }
}

pub async fn requeue_tick(
    requeuer: Arc<Requeuer>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.wait_for(|stop| *stop) => break,
        }
        requeuer.run_once().await;
    }
    debug!("requeue worker stopped");
}
