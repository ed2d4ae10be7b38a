//! Database layer for MailScout
//!
//! Provides:
//! - SeaORM entity models
//! - The `RecordStore` trait and its two implementations
//! - Connection pool management and schema bootstrap

mod memory;
pub mod models;
mod repository;
mod store;

pub use memory::MemoryStore;
pub use repository::Repository;
pub use store::{
    BatchJobUpdate, NewApiConfig, NewBatchJob, NewSearchRecord, RecordStore, SearchStats,
    DEFAULT_PAGE_SIZE,
};

use crate::config::{DatabaseConfig, StoreBackend};
use crate::db::models::{ApiConfigEntity, BatchJobEntity, SearchRecordEntity};
use crate::errors::{AppError, Result};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Schema};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Database connection pool wrapper
#[derive(Clone)]
pub struct DbPool {
    conn: DatabaseConnection,
}

impl DbPool {
    /// Create a new database pool from configuration
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!("Connecting to database...");

        let mut opts = ConnectOptions::new(&config.url);
        opts
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .sqlx_logging(true);

        let conn = Database::connect(opts)
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Failed to connect: {}", e),
            })?;

        info!("Database connection established");

        Ok(Self { conn })
    }

    /// Wrap an existing connection
    pub fn from_connection(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub fn conn(&self) -> &DatabaseConnection {
        &self.conn
    }

    /// Create the MailScout tables if they do not exist yet
    pub async fn init_schema(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        let schema = Schema::new(backend);

        let mut statements = vec![
            schema.create_table_from_entity(SearchRecordEntity),
            schema.create_table_from_entity(BatchJobEntity),
            schema.create_table_from_entity(ApiConfigEntity),
        ];

        for statement in statements.iter_mut() {
            statement.if_not_exists();
            self.conn.execute(backend.build(&*statement)).await?;
        }

        info!("Database schema ready");
        Ok(())
    }

    /// Ping the database to check connectivity
    pub async fn ping(&self) -> Result<()> {
        self.conn
            .ping()
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Ping failed: {}", e),
            })
    }
}

/// Build the store selected by configuration
pub async fn connect_store(config: &DatabaseConfig) -> Result<Arc<dyn RecordStore>> {
    match config.backend {
        StoreBackend::Memory => {
            info!("Using in-memory record store");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Sql => {
            let pool = DbPool::new(config).await?;
            pool.init_schema().await?;
            Ok(Arc::new(Repository::new(pool)))
        }
    }
}
