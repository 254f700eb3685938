use std::fmt::Debug;

use api::event::EventKind;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::session::Session;

pub mod requeue;
pub mod store;
pub mod webhook;

/// A webhook waiting in the outbound queue. `session` is a copy taken when the event happened;
/// the live registry entry may be gone by the time it is delivered. `at` is when the event
/// happened, which is what the payload reports rather than the delivery time.
#[derive(Clone, Debug)]
pub struct OutboundWebhook {
    pub kind: EventKind,
    pub stream_key: String,
    pub session: Session,
    pub extra: Option<serde_json::Value>,
    pub at: DateTime<Utc>,
}

#[async_trait]
pub trait EventHook: Debug {
    /// Consumes the outbound queue until every sender is dropped.
    async fn hook(&self, receiver: mpsc::Receiver<OutboundWebhook>);
}
