use anyhow::Context;
use std::sync::Arc;
use tracing::info;

use crate::approval::{
    ApprovalGateway, HistoryLog, MemoryHistory, MemoryPendingStore, PendingStore, PgHistory, PgPendingStore,
};
use crate::config::{AppConfig, StoreBackend};
use crate::database::{Catalog, DatabaseManager, Executor, PgCatalog, PgExecutor};
use crate::translator::{LlmTranslator, Translator};

/// Everything a request handler needs. Cheap to clone; shared via axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<ApprovalGateway>,
    pub translator: Arc<dyn Translator>,
    pub databases: Option<Arc<DatabaseManager>>,
    pub catalog: Option<Arc<dyn Catalog>>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(gateway: Arc<ApprovalGateway>, translator: Arc<dyn Translator>, config: AppConfig) -> Self {
        Self {
            gateway,
            translator,
            databases: None,
            catalog: None,
            config: Arc::new(config),
        }
    }

    pub fn with_databases(mut self, databases: Arc<DatabaseManager>) -> Self {
        self.databases = Some(databases);
        self
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn Catalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Wire the production collaborators described by `config`
    pub async fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        let databases = Arc::new(DatabaseManager::new(&config));
        let executor: Arc<dyn Executor> = Arc::new(PgExecutor::new(databases.clone(), &config.database));

        let (store, history): (Arc<dyn PendingStore>, Arc<dyn HistoryLog>) = match config.gateway.store_backend {
            StoreBackend::Memory => {
                let store: Arc<dyn PendingStore> = Arc::new(MemoryPendingStore::new());
                let history: Arc<dyn HistoryLog> = Arc::new(MemoryHistory::new(config.gateway.history_limit));
                (store, history)
            }
            StoreBackend::Postgres => {
                let pool = databases
                    .system_pool()
                    .await
                    .context("connecting to the system database")?;

                let store = PgPendingStore::new(pool.clone());
                store.init().await.context("creating pending_operations")?;
                let history = PgHistory::new(pool, config.gateway.history_limit);
                history.init().await.context("creating operation_history")?;

                let store: Arc<dyn PendingStore> = Arc::new(store);
                let history: Arc<dyn HistoryLog> = Arc::new(history);
                (store, history)
            }
        };
        info!("Pending store backend: {}", store.backend());

        let catalog: Arc<dyn Catalog> = Arc::new(PgCatalog::new(databases.clone()));
        let translator = LlmTranslator::new(config.translator.clone(), Some(catalog.clone()))
            .context("building translator client")?;
        if config.translator.api_key.is_none() {
            tracing::warn!("TRANSLATOR_API_KEY not set; /nl-query will be unavailable");
        }

        let gateway = ApprovalGateway::new(store, executor, history, &config.gateway);

        Ok(Self::new(Arc::new(gateway), Arc::new(translator), config)
            .with_databases(databases)
            .with_catalog(catalog))
    }
}
