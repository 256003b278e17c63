use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// Живая бронь = существующая строка. Отмена удаляет строку и возвращает
// quantity в пул; отдельного статуса "cancelled" нет.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Booking {
    pub id: i64,
    pub customer_id: i64,
    pub ticket_id: i64,
    pub event_id: i64,
    pub quantity: i32,
    pub created_at: NaiveDateTime,
}
