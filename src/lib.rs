pub mod config;
pub mod database;
pub mod redis_client;
pub mod errors;
pub mod models;
pub mod controllers;
pub mod middleware;
pub mod cache;
pub mod services;

use std::sync::Arc;
use tokio::task;

use services::ledger::InventoryLedger;
use services::notify::Notifier;

// Shared state для всего приложения
#[derive(Clone)]
pub struct AppState {
    pub db: database::Database,
    pub redis: redis_client::RedisClient,
    pub cache: cache::CacheService,
    pub config: config::Config,
    pub ledger: InventoryLedger,
    pub notifier: Arc<Notifier>,
}

impl AppState {
    pub async fn new(config: config::Config) -> Result<Arc<Self>, Box<dyn std::error::Error>> {
        let db = database::Database::new(&config.database).await?;

        db.run_migrations().await?;

        let redis = redis_client::RedisClient::new(&config.redis).await?;
        let cache = cache::CacheService::new(redis.clone(), db.clone());
        let ledger = InventoryLedger::new(db.clone());
        let notifier = Arc::new(Notifier::from_config(&config.notifier));

        let state = Arc::new(Self {
            db,
            redis,
            cache,
            config,
            ledger,
            notifier,
        });

        // Warmup cache в фоне
        let state_for_bg = state.clone();
        task::spawn(async move {
            state_for_bg.cache.warmup_cache().await;
        });

        Ok(state)
    }
}
