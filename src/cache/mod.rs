use crate::{database::Database, redis_client::RedisClient};
use tracing::info;

pub mod events;
pub mod tickets;

#[derive(Clone)]
pub struct CacheService {
    redis: RedisClient,
    db: Database,
}

impl CacheService {
    pub fn new(redis: RedisClient, db: Database) -> Self {
        Self { redis, db }
    }

    // Прогрев кеша при старте
    pub async fn warmup_cache(&self) {
        info!("Starting cache warmup...");

        // Каталог событий — самая горячая выборка
        let _ = self.get_events().await;

        info!("Cache warmup done");
    }
}
