use redis::{aio::MultiplexedConnection, Client};
use tracing::info;

use crate::config::RedisConfig;

#[derive(Clone)]
pub struct RedisClient {
    pub conn: MultiplexedConnection,
}

impl RedisClient {
    pub async fn new(config: &RedisConfig) -> redis::RedisResult<Self> {
        let client = Client::open(config.url.as_str())?;
        let mut conn = client.get_multiplexed_tokio_connection().await?;

        // Сразу проверяем соединение, чтобы упасть на старте, а не на первом запросе
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!("Redis connection verified");

        Ok(RedisClient { conn })
    }
}
