use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

use crate::errors::ApiError;
use crate::middleware::AuthUser;
use crate::models::Booking;
use crate::services::access;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/bookings", get(list_my_bookings))
        .route(
            "/events/{event_id}/tickets/{ticket_id}/bookings",
            post(create_booking),
        )
        .route(
            "/bookings/{id}",
            axum::routing::patch(update_booking).delete(cancel_booking),
        )
}

/* ---------- БРОНИРОВАНИЯ ---------- */

#[derive(Debug, Deserialize, Validate)]
struct CreateBookingRequest {
    #[validate(range(min = 1))]
    quantity: i32,
}

// POST /api/events/{event_id}/tickets/{ticket_id}/bookings
async fn create_booking(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path((event_id, ticket_id)): Path<(i64, i64)>,
    Json(req): Json<CreateBookingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate().map_err(|_| ApiError::InvalidQuantity)?;

    let customer_id = access::customer_profile_id(&state.db.pool, &user).await?;

    let booking = state
        .ledger
        .create_booking(event_id, ticket_id, customer_id, req.quantity)
        .await?;

    state.cache.invalidate_tickets(event_id).await;

    // Подтверждение уходит после коммита и не может откатить бронь
    let notifier = state.notifier.clone();
    let message = format!(
        "Бронь №{} подтверждена, билетов: {}",
        booking.id, booking.quantity
    );
    let booking_id = booking.id;
    tokio::spawn(async move {
        notifier.send_booking_confirmation(booking_id, &message).await;
    });

    Ok((StatusCode::CREATED, Json(booking)))
}

// GET /api/bookings - брони текущего покупателя
async fn list_my_bookings(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<Vec<Booking>>, ApiError> {
    let customer_id = access::customer_profile_id(&state.db.pool, &user).await?;

    let bookings: Vec<Booking> = sqlx::query_as(
        "SELECT * FROM bookings WHERE customer_id = $1 ORDER BY created_at DESC",
    )
    .bind(customer_id)
    .fetch_all(&state.db.pool)
    .await?;

    Ok(Json(bookings))
}

#[derive(Debug, Deserialize, Validate)]
struct UpdateBookingRequest {
    #[validate(range(min = 1))]
    quantity: i32,
}

// PATCH /api/bookings/{id}
async fn update_booking(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(booking_id): Path<i64>,
    Json(req): Json<UpdateBookingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate().map_err(|_| ApiError::InvalidQuantity)?;

    let customer_id = access::customer_profile_id(&state.db.pool, &user).await?;

    let booking = state
        .ledger
        .update_booking(booking_id, customer_id, req.quantity)
        .await?;

    state.cache.invalidate_tickets(booking.event_id).await;

    Ok(Json(booking))
}

// DELETE /api/bookings/{id}
async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(booking_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let customer_id = access::customer_profile_id(&state.db.pool, &user).await?;

    // event_id нужен для инвалидации кеша уже после удаления строки
    let event_id: Option<i64> = sqlx::query_scalar(
        "SELECT event_id FROM bookings WHERE id = $1 AND customer_id = $2",
    )
    .bind(booking_id)
    .bind(customer_id)
    .fetch_optional(&state.db.pool)
    .await?;
    let event_id = event_id.ok_or(ApiError::NotFound)?;

    state.ledger.cancel_booking(booking_id, customer_id).await?;

    state.cache.invalidate_tickets(event_id).await;

    Ok(StatusCode::NO_CONTENT)
}
