use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Пул билетов одного типа. `availability` — единственный разделяемый
/// счётчик в системе; менять его можно только под блокировкой строки
/// (см. services::ledger).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Ticket {
    pub id: i64,
    pub event_id: i64,
    pub ticket_type: String,
    pub price: f64,
    pub availability: i32,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}
