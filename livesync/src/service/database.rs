use anyhow::{Context, Result};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use tracing::info;

use crate::config::Database as DatabaseConfig;
use crate::migration::{Migrator, MigratorTrait};

/// Pooled connection to the lifecycle store, migrated to the latest schema.
#[derive(Clone, Debug)]
pub struct DatabaseService {
    pub connection: DatabaseConnection,
}

fn connect_options(config: &DatabaseConfig) -> ConnectOptions {
    let mut opt = ConnectOptions::new(&config.url);
    opt.max_connections(config.max_connections)
        .connect_timeout(config.connect_timeout())
        .sqlx_logging(false);
    if let Some(idle) = config.idle_timeout() {
        opt.idle_timeout(idle);
    }
    if let Some(lifetime) = config.max_lifetime() {
        opt.max_lifetime(lifetime);
    }
    opt
}

impl DatabaseService {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let connection = Database::connect(connect_options(config))
            .await
            .with_context(|| format!("Failed to connect to {}", config.url))?;
        Migrator::up(&connection, None)
            .await
            .context("Failed to migrate stream lifecycles")?;
        info!(
            url = config.url,
            max_connections = config.max_connections,
            "lifecycle store ready"
        );
        Ok(Self { connection })
    }

    pub fn get_connection(&self) -> &DatabaseConnection {
        &self.connection
    }
}
