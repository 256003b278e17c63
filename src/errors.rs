use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

/// Единая таксономия ошибок леджера и обвязки вокруг него.
///
/// Разделение важно для клиента: `Conflict` можно безопасно повторить
/// тем же запросом, всё остальное повторять бессмысленно без изменения
/// самого запроса.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("quantity must be a positive integer")]
    InvalidQuantity,

    #[error("requested quantity exceeds available tickets")]
    InsufficientAvailability,

    #[error("resource not found")]
    NotFound,

    #[error("operation is not permitted for this profile")]
    Forbidden,

    #[error("principal role does not match the profile kind")]
    RoleMismatch,

    #[error("role is fixed at registration and cannot be changed")]
    RoleImmutable,

    #[error("concurrent modification, retry the request")]
    Conflict,

    #[error("authentication required")]
    Unauthorized,

    #[error("validation error: {0}")]
    Validation(String),

    #[error("database error")]
    Database(sqlx::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidQuantity
            | ApiError::InsufficientAvailability
            | ApiError::RoleMismatch
            | ApiError::RoleImmutable
            | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::Conflict => StatusCode::CONFLICT,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Database(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidQuantity => "INVALID_QUANTITY",
            ApiError::InsufficientAvailability => "INSUFFICIENT_AVAILABILITY",
            ApiError::NotFound => "NOT_FOUND",
            ApiError::Forbidden => "FORBIDDEN",
            ApiError::RoleMismatch => "ROLE_MISMATCH",
            ApiError::RoleImmutable => "ROLE_IMMUTABLE",
            ApiError::Conflict => "CONFLICT",
            ApiError::Unauthorized => "UNAUTHORIZED",
            ApiError::Validation(_) => "VALIDATION_ERROR",
            ApiError::Database(_) => "DATABASE_ERROR",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// Коды Postgres, которые означают транзиентную конкуренцию за строку:
/// lock_timeout, serialization failure, deadlock. Все три безопасно
/// повторять — частичных записей после них не остаётся.
const PG_LOCK_NOT_AVAILABLE: &str = "55P03";
const PG_SERIALIZATION_FAILURE: &str = "40001";
const PG_DEADLOCK_DETECTED: &str = "40P01";
const PG_UNIQUE_VIOLATION: &str = "23505";

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &e {
            match db.code().as_deref() {
                Some(PG_LOCK_NOT_AVAILABLE)
                | Some(PG_SERIALIZATION_FAILURE)
                | Some(PG_DEADLOCK_DETECTED) => {
                    warn!("database contention, surfacing as retryable conflict: {:?}", e);
                    return ApiError::Conflict;
                }
                Some(PG_UNIQUE_VIOLATION) => {
                    return ApiError::Validation("запись уже существует".to_string());
                }
                _ => {}
            }
        }
        ApiError::Database(e)
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(e: validator::ValidationErrors) -> Self {
        ApiError::Validation(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        // Внутренности пишем в лог, наружу отдаём только общий текст
        let public_message = match &self {
            ApiError::Database(e) => {
                error!(error = ?e, "database error");
                "Внутренняя ошибка базы данных".to_string()
            }
            ApiError::Internal(msg) => {
                error!(message = %msg, "internal error");
                "Внутренняя ошибка сервера".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": public_message,
            }
        }));

        (status, body).into_response()
    }
}
