//! Role-Gate: проверки роли, профиля и владения до того, как запрос
//! доберётся до леджера.
//!
//! Два режима отказа, намеренно разных:
//! - пути update/delete маскируют чужие сущности под `NotFound`, чтобы не
//!   раскрывать сам факт их существования;
//! - пути create отдают явный `Forbidden`, когда цель и так известна
//!   клиенту (id события публичен через каталог).

use sqlx::PgPool;

use crate::errors::ApiError;
use crate::middleware::AuthUser;
use crate::models::Role;

/// Роль принципала должна совпадать с типом сущности, которую он мутирует.
pub fn ensure_role(user: &AuthUser, expected: Role) -> Result<(), ApiError> {
    if user.role != expected {
        return Err(ApiError::RoleMismatch);
    }
    Ok(())
}

/// id customer-профиля принципала. Отсутствие профиля — это Forbidden:
/// роль подходит, но бронировать без профиля нечем.
pub async fn customer_profile_id(pool: &PgPool, user: &AuthUser) -> Result<i64, ApiError> {
    ensure_role(user, Role::Customer)?;

    let id: Option<i64> =
        sqlx::query_scalar("SELECT id FROM customer_profiles WHERE user_id = $1")
            .bind(user.user_id)
            .fetch_optional(pool)
            .await?;

    id.ok_or(ApiError::Forbidden)
}

pub async fn organizer_profile_id(pool: &PgPool, user: &AuthUser) -> Result<i64, ApiError> {
    ensure_role(user, Role::Organizer)?;

    let id: Option<i64> =
        sqlx::query_scalar("SELECT id FROM organizer_profiles WHERE user_id = $1")
            .bind(user.user_id)
            .fetch_optional(pool)
            .await?;

    id.ok_or(ApiError::Forbidden)
}

/// Владение событием для путей create (вложенные билеты): событие не
/// найдено — NotFound, найдено, но чужое — явный Forbidden.
pub async fn require_event_owner(
    pool: &PgPool,
    event_id: i64,
    organizer_id: i64,
) -> Result<(), ApiError> {
    let owner: Option<i64> = sqlx::query_scalar("SELECT organizer_id FROM events WHERE id = $1")
        .bind(event_id)
        .fetch_optional(pool)
        .await?;

    match owner {
        None => Err(ApiError::NotFound),
        Some(id) if id != organizer_id => Err(ApiError::Forbidden),
        Some(_) => Ok(()),
    }
}

/// Владение событием для путей update/delete: чужое событие неотличимо
/// от несуществующего.
pub async fn require_event_owner_masked(
    pool: &PgPool,
    event_id: i64,
    organizer_id: i64,
) -> Result<(), ApiError> {
    let owned: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM events WHERE id = $1 AND organizer_id = $2)",
    )
    .bind(event_id)
    .bind(organizer_id)
    .fetch_one(pool)
    .await?;

    if owned {
        Ok(())
    } else {
        Err(ApiError::NotFound)
    }
}

/// Владение пулом билетов (через его событие), маскированный вариант.
pub async fn require_ticket_owner_masked(
    pool: &PgPool,
    ticket_id: i64,
    organizer_id: i64,
) -> Result<i64, ApiError> {
    let event_id: Option<i64> = sqlx::query_scalar(
        "SELECT t.event_id
         FROM tickets t
         JOIN events e ON e.id = t.event_id
         WHERE t.id = $1 AND e.organizer_id = $2",
    )
    .bind(ticket_id)
    .bind(organizer_id)
    .fetch_optional(pool)
    .await?;

    event_id.ok_or(ApiError::NotFound)
}
