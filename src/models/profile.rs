use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::FromRow;

// Профили привязаны к пользователю строго 1:1 (UNIQUE user_id в схеме).
// Какой из двух профилей можно создать, решает Role-Gate, а не модель.

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct OrganizerProfile {
    pub id: i64,
    pub user_id: i64,
    pub company_name: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CustomerProfile {
    pub id: i64,
    pub user_id: i64,
    pub phone: Option<String>,
    pub created_at: NaiveDateTime,
}
