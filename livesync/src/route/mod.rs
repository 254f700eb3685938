use crate::config::Config;
use crate::service::database::DatabaseService;

pub mod lifecycle;
pub mod webhook;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub database: DatabaseService,
}
