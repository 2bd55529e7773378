use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::core::cache::{DedupCache, TtlCache};
use crate::core::client::database::{DatabaseClient, SqliteClient};
use crate::core::client::lock::LockRegistry;
use crate::error::{FleetError, FleetResult};
use crate::types::log::LogRegistry;
use crate::types::params::{ManagerParams, SchedulerParams, ServerParams};

/// (category, log name)
pub type FrontierKey = (String, String);

/// Everything a manager request handler or background task needs.
pub struct ManagerConfig {
    server: ServerParams,
    scheduler: SchedulerParams,
    database: Arc<dyn DatabaseClient>,
    locks: LockRegistry,
    frontier_cache: TtlCache<FrontierKey, Option<u64>>,
    dedup_cache: DedupCache,
}

impl ManagerConfig {
    pub fn new(server: ServerParams, scheduler: SchedulerParams, database: Arc<dyn DatabaseClient>) -> Self {
        let frontier_cache = TtlCache::new(Duration::from_secs(scheduler.frontier_ttl_sec));
        let dedup_cache = DedupCache::new(scheduler.dedup_cache_capacity);
        Self { server, scheduler, database, locks: LockRegistry::new(), frontier_cache, dedup_cache }
    }

    /// Opens the store, applies the schema and loads the log registry file if one is given.
    pub async fn from_params(params: ManagerParams) -> FleetResult<Self> {
        let database = SqliteClient::open(&params.database.path).await?;
        info!(path = %params.database.path, "Database opened");
        let config = Self::new(params.server, params.scheduler, Arc::new(database));

        if let Some(path) = params.logs_file {
            let source = tokio::fs::read_to_string(&path).await?;
            let registry = LogRegistry::from_yaml(&source)
                .map_err(|e| FleetError::Config(format!("invalid logs file {}: {e}", path.display())))?;
            config.load_registry(&registry).await?;
        }
        Ok(config)
    }

    /// Upserts every category and log of `registry` into the store.
    pub async fn load_registry(&self, registry: &LogRegistry) -> FleetResult<()> {
        for category in registry.effective_categories() {
            debug!(category = %category.name, weight = category.weight, "Registering category");
            self.database.upsert_category(category).await?;
        }
        for log in &registry.logs {
            debug!(log_name = %log.name, category = %log.category, "Registering log");
            self.database.upsert_log(log.clone()).await?;
        }
        info!(logs = registry.logs.len(), "Log registry loaded");
        Ok(())
    }

    pub fn server_config(&self) -> &ServerParams {
        &self.server
    }

    pub fn scheduler(&self) -> &SchedulerParams {
        &self.scheduler
    }

    pub fn database(&self) -> &Arc<dyn DatabaseClient> {
        &self.database
    }

    pub fn locks(&self) -> &LockRegistry {
        &self.locks
    }

    pub fn frontier_cache(&self) -> &TtlCache<FrontierKey, Option<u64>> {
        &self.frontier_cache
    }

    pub fn dedup_cache(&self) -> &DedupCache {
        &self.dedup_cache
    }
}
