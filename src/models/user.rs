use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Закрытый тип роли. Значение выбирается один раз при регистрации;
/// ни один SQL-путь в приложении не обновляет колонку `role`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Organizer,
    Customer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Organizer => "organizer",
            Role::Customer => "customer",
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub user_id: i64,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub name: String,
    pub role: Role,
    pub is_active: bool,
    pub registered_at: NaiveDateTime,
}

impl User {
    // Найти активного пользователя по email
    pub async fn find_by_email(
        email: &str,
        db: &crate::database::Database,
    ) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE email = $1 AND is_active = TRUE",
        )
        .bind(email)
        .fetch_optional(&db.pool)
        .await
    }

    pub fn verify_password(&self, password: &str) -> bool {
        bcrypt::verify(password, &self.password_hash).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_serde() {
        let json = serde_json::to_string(&Role::Organizer).unwrap();
        assert_eq!(json, "\"organizer\"");
        let back: Role = serde_json::from_str("\"customer\"").unwrap();
        assert_eq!(back, Role::Customer);
    }

    #[test]
    fn as_str_matches_db_check_constraint() {
        assert_eq!(Role::Organizer.as_str(), "organizer");
        assert_eq!(Role::Customer.as_str(), "customer");
    }
}
