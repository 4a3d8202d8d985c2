use sqlx::{postgres::PgPoolOptions, PgPool};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;

use crate::config::AppConfig;

/// Errors from DatabaseManager
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Invalid database URL")]
    InvalidDatabaseUrl,

    #[error("Invalid database name: {0}")]
    InvalidDatabaseName(String),

    #[error("Unknown target database: {0}")]
    UnknownTarget(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Connection pools for the system database and every configured target database.
/// Owned by the application state; pools are created lazily on first use.
pub struct DatabaseManager {
    base_url: Option<String>,
    system_database: String,
    targets: BTreeMap<String, String>,
    max_connections: u32,
    connection_timeout: Duration,
    pools: Arc<RwLock<HashMap<String, PgPool>>>,
}

impl DatabaseManager {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            base_url: config.database.url.clone(),
            system_database: config.database.system_database.clone(),
            targets: config.gateway.databases.clone(),
            max_connections: config.database.max_connections,
            connection_timeout: Duration::from_secs(config.database.connection_timeout),
            pools: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Logical target names mapped to physical database names
    pub fn targets(&self) -> &BTreeMap<String, String> {
        &self.targets
    }

    pub fn is_known_target(&self, logical: &str) -> bool {
        self.targets.contains_key(logical)
    }

    /// Pool for the database holding gateway state
    pub async fn system_pool(&self) -> Result<PgPool, DatabaseError> {
        self.get_pool(&self.system_database).await
    }

    /// Pool for a logical target database
    pub async fn target_pool(&self, logical: &str) -> Result<PgPool, DatabaseError> {
        let physical = self
            .targets
            .get(logical)
            .ok_or_else(|| DatabaseError::UnknownTarget(logical.to_string()))?;
        self.get_pool(physical).await
    }

    /// Get existing pool or create a new one lazily
    async fn get_pool(&self, database_name: &str) -> Result<PgPool, DatabaseError> {
        if !Self::is_valid_db_name(database_name) {
            return Err(DatabaseError::InvalidDatabaseName(database_name.to_string()));
        }

        // Fast path: try read lock
        {
            let pools = self.pools.read().await;
            if let Some(pool) = pools.get(database_name) {
                return Ok(pool.clone());
            }
        }

        let connection_string = self.build_connection_string(database_name)?;

        let mut pools = self.pools.write().await;
        // Another task may have connected while we waited for the write lock
        if let Some(pool) = pools.get(database_name) {
            return Ok(pool.clone());
        }

        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.connection_timeout)
            .connect(&connection_string)
            .await?;
        pools.insert(database_name.to_string(), pool.clone());

        info!("Created database pool for: {}", database_name);
        Ok(pool)
    }

    /// Swap the database name into the path of the configured server URL
    fn build_connection_string(&self, database_name: &str) -> Result<String, DatabaseError> {
        let base = self
            .base_url
            .as_deref()
            .ok_or(DatabaseError::ConfigMissing("DATABASE_URL"))?;

        let mut url = url::Url::parse(base).map_err(|_| DatabaseError::InvalidDatabaseUrl)?;
        url.set_path(&format!("/{}", database_name));
        Ok(url.into())
    }

    /// Pings the system pool to ensure connectivity
    pub async fn health_check(&self) -> Result<(), DatabaseError> {
        let pool = self.system_pool().await?;
        sqlx::query("SELECT 1").execute(&pool).await?;
        Ok(())
    }

    /// Close and remove all pools (e.g., on shutdown)
    pub async fn close_all(&self) {
        let mut pools = self.pools.write().await;
        for (name, pool) in pools.drain() {
            pool.close().await;
            info!("Closed database pool: {}", name);
        }
    }

    /// Database names end up in connection URLs; keep them to [A-Za-z0-9_]
    fn is_valid_db_name(name: &str) -> bool {
        !name.is_empty()
            && name.len() <= 63
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    }
}
