pub mod notify;
pub mod postgres;
pub mod sqlite;
pub mod trait_def;

#[cfg(test)]
pub(crate) mod testing;

pub use notify::{ChangeEvent, ChangeKind, NotifyingStorage, Table};
pub use postgres::{PostgresStorage, CHANGE_CHANNEL};
pub use sqlite::SqliteStorage;
pub use trait_def::{Storage, StorageError, StorageResult};

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use crate::config::{DatabaseBackend, DatabaseConfig};

/// Connect to the configured backend and create its tables
pub async fn connect(config: &DatabaseConfig) -> Result<Arc<dyn Storage>> {
    let storage: Arc<dyn Storage> = match config.backend {
        DatabaseBackend::Sqlite => {
            info!("Using SQLite storage: {}", config.url);
            Arc::new(SqliteStorage::new(&config.url, config.max_connections).await?)
        }
        DatabaseBackend::Postgres => {
            info!("Using PostgreSQL storage: {}", config.url);
            Arc::new(PostgresStorage::new(&config.url, config.max_connections).await?)
        }
    };

    storage.init().await?;
    info!("Database initialized successfully");
    Ok(storage)
}

/// Connect for a long-running process whose readers follow table changes.
///
/// SQLite publishes the writes made through the returned storage only.
/// PostgreSQL relays trigger notifications, which also carry writes from
/// other processes such as `folio-admin`.
pub async fn connect_with_changes(
    config: &DatabaseConfig,
    capacity: usize,
) -> Result<Arc<dyn Storage>> {
    match config.backend {
        DatabaseBackend::Sqlite => {
            let backend = connect(config).await?;
            Ok(Arc::new(NotifyingStorage::new(backend, capacity)))
        }
        DatabaseBackend::Postgres => {
            info!("Using PostgreSQL storage: {}", config.url);
            let storage = PostgresStorage::new(&config.url, config.max_connections).await?;
            storage.init().await?;
            info!("Database initialized successfully");
            Ok(Arc::new(storage.with_change_feed(capacity).await?))
        }
    }
}
