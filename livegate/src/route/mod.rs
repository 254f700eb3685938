use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::hook::requeue::Requeuer;
use crate::session::manager::SessionManager;

pub mod hls;
pub mod ingest;
pub mod status;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub manager: SessionManager,
    pub requeuer: Arc<Requeuer>,
    pub started_at: DateTime<Utc>,
}
