use crate::cache::CacheService;
use crate::models::Ticket;
use redis::AsyncCommands;

// Список пулов кешируется коротко: в нём лежит availability, и хотя леджер
// инвалидирует ключ после каждой мутации, TTL страхует от потерянного DEL.
const TICKETS_TTL_SECONDS: u64 = 60;

fn tickets_key(event_id: i64) -> String {
    format!("tickets:{}", event_id)
}

impl CacheService {
    // Получить пулы билетов события
    pub async fn get_tickets(&self, event_id: i64) -> Vec<Ticket> {
        if let Ok(tickets) = self.get_tickets_from_cache(event_id).await {
            return tickets;
        }

        if let Ok(tickets) = self.load_tickets_from_db(event_id).await {
            let _ = self.save_tickets_to_cache(event_id, &tickets).await;
            return tickets;
        }

        vec![]
    }

    /// Сброс после любой мутации леджера или правки пула организатором.
    pub async fn invalidate_tickets(&self, event_id: i64) {
        let mut conn = self.redis.conn.clone();
        let _: Result<(), _> = conn.del(tickets_key(event_id)).await;
    }

    async fn load_tickets_from_db(&self, event_id: i64) -> Result<Vec<Ticket>, sqlx::Error> {
        sqlx::query_as::<_, Ticket>(
            "SELECT * FROM tickets WHERE event_id = $1 ORDER BY id",
        )
        .bind(event_id)
        .fetch_all(&self.db.pool)
        .await
    }

    async fn get_tickets_from_cache(&self, event_id: i64) -> Result<Vec<Ticket>, redis::RedisError> {
        let mut conn = self.redis.conn.clone();
        let data: String = conn.get(tickets_key(event_id)).await?;
        let tickets: Vec<Ticket> = serde_json::from_str(&data).map_err(|_| {
            redis::RedisError::from((redis::ErrorKind::TypeError, "Parse error"))
        })?;
        Ok(tickets)
    }

    async fn save_tickets_to_cache(
        &self,
        event_id: i64,
        tickets: &[Ticket],
    ) -> Result<(), redis::RedisError> {
        let data = serde_json::to_string(tickets).map_err(|_| {
            redis::RedisError::from((redis::ErrorKind::TypeError, "Serialize error"))
        })?;
        let mut conn = self.redis.conn.clone();
        conn.set_ex(tickets_key(event_id), data, TICKETS_TTL_SECONDS).await
    }
}
