use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch},
    Json, Router,
};
use chrono::NaiveDateTime;
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

use crate::errors::ApiError;
use crate::middleware::AuthUser;
use crate::models::{Booking, Event, Ticket};
use crate::services::access;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/events", get(list_events).post(create_event))
        .route(
            "/events/{id}",
            get(get_event).patch(update_event).delete(delete_event),
        )
        .route("/events/{id}/tickets", get(list_tickets).post(create_ticket))
        .route("/events/{id}/bookings", get(list_event_bookings))
        .route("/tickets/{id}", patch(update_ticket))
}

/* ---------- СОБЫТИЯ ---------- */

// GET /api/events - публичный каталог, отдаём из кеша
async fn list_events(State(state): State<Arc<AppState>>) -> Json<Vec<Event>> {
    Json(state.cache.get_events().await)
}

#[derive(Debug, Deserialize, Validate)]
struct CreateEventRequest {
    #[validate(length(min = 1))]
    title: String,
    #[validate(length(min = 1))]
    venue: String,
    description: Option<String>,
    starts_at: Option<NaiveDateTime>,
}

async fn create_event(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<CreateEventRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;

    let organizer_id = access::organizer_profile_id(&state.db.pool, &user).await?;

    let event: Event = sqlx::query_as(
        "INSERT INTO events (organizer_id, title, venue, description, starts_at)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING *",
    )
    .bind(organizer_id)
    .bind(&req.title)
    .bind(&req.venue)
    .bind(&req.description)
    .bind(req.starts_at)
    .fetch_one(&state.db.pool)
    .await?;

    state.cache.invalidate_events().await;

    Ok((StatusCode::CREATED, Json(event)))
}

async fn get_event(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<i64>,
) -> Result<Json<Event>, ApiError> {
    let event: Option<Event> = sqlx::query_as("SELECT * FROM events WHERE id = $1")
        .bind(event_id)
        .fetch_optional(&state.db.pool)
        .await?;

    event.map(Json).ok_or(ApiError::NotFound)
}

#[derive(Debug, Deserialize, Validate)]
struct UpdateEventRequest {
    #[validate(length(min = 1))]
    title: Option<String>,
    #[validate(length(min = 1))]
    venue: Option<String>,
    description: Option<String>,
    starts_at: Option<NaiveDateTime>,
}

async fn update_event(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(event_id): Path<i64>,
    Json(req): Json<UpdateEventRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;

    let organizer_id = access::organizer_profile_id(&state.db.pool, &user).await?;
    // Чужое событие маскируем под NotFound
    access::require_event_owner_masked(&state.db.pool, event_id, organizer_id).await?;

    let mut sets: Vec<String> = vec!["updated_at = NOW()".to_string()];
    let mut bind_idx = 1;
    if req.title.is_some() {
        sets.push(format!("title = ${}", bind_idx));
        bind_idx += 1;
    }
    if req.venue.is_some() {
        sets.push(format!("venue = ${}", bind_idx));
        bind_idx += 1;
    }
    if req.description.is_some() {
        sets.push(format!("description = ${}", bind_idx));
        bind_idx += 1;
    }
    if req.starts_at.is_some() {
        sets.push(format!("starts_at = ${}", bind_idx));
        bind_idx += 1;
    }

    let q = format!(
        "UPDATE events SET {} WHERE id = ${} RETURNING *",
        sets.join(", "),
        bind_idx
    );

    let mut dbq = sqlx::query_as::<_, Event>(&q);
    if let Some(title) = req.title {
        dbq = dbq.bind(title);
    }
    if let Some(venue) = req.venue {
        dbq = dbq.bind(venue);
    }
    if let Some(description) = req.description {
        dbq = dbq.bind(description);
    }
    if let Some(starts_at) = req.starts_at {
        dbq = dbq.bind(starts_at);
    }

    let event = dbq.bind(event_id).fetch_one(&state.db.pool).await?;

    state.cache.invalidate_events().await;

    // Уведомление после коммита, в фоне; его судьба на ответ не влияет
    let notifier = state.notifier.clone();
    tokio::spawn(async move {
        notifier
            .send_event_update(event_id, "Детали события были обновлены")
            .await;
    });

    Ok(Json(event))
}

async fn delete_event(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(event_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let organizer_id = access::organizer_profile_id(&state.db.pool, &user).await?;
    access::require_event_owner_masked(&state.db.pool, event_id, organizer_id).await?;

    // Пулы и брони события уходят каскадом вместе с ним
    sqlx::query("DELETE FROM events WHERE id = $1")
        .bind(event_id)
        .execute(&state.db.pool)
        .await?;

    state.cache.invalidate_events().await;
    state.cache.invalidate_tickets(event_id).await;

    Ok(StatusCode::NO_CONTENT)
}

/* ---------- ПУЛЫ БИЛЕТОВ ---------- */

// GET /api/events/{id}/tickets - публичный список, отдаём из кеша
async fn list_tickets(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<i64>,
) -> Json<Vec<Ticket>> {
    Json(state.cache.get_tickets(event_id).await)
}

#[derive(Debug, Deserialize, Validate)]
struct CreateTicketRequest {
    #[validate(length(min = 1))]
    ticket_type: String,
    #[validate(range(min = 0.0))]
    price: f64,
    // Начальное значение счётчика = ёмкость пула
    #[validate(range(min = 0))]
    availability: i32,
}

async fn create_ticket(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(event_id): Path<i64>,
    Json(req): Json<CreateTicketRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;

    let organizer_id = access::organizer_profile_id(&state.db.pool, &user).await?;
    // Путь create: событие уже известно клиенту, отдаём явный Forbidden
    access::require_event_owner(&state.db.pool, event_id, organizer_id).await?;

    let ticket: Ticket = sqlx::query_as(
        "INSERT INTO tickets (event_id, ticket_type, price, availability)
         VALUES ($1, $2, $3, $4)
         RETURNING *",
    )
    .bind(event_id)
    .bind(&req.ticket_type)
    .bind(req.price)
    .bind(req.availability)
    .fetch_one(&state.db.pool)
    .await?;

    state.cache.invalidate_tickets(event_id).await;

    Ok((StatusCode::CREATED, Json(ticket)))
}

#[derive(Debug, Deserialize, Validate)]
struct UpdateTicketRequest {
    #[validate(length(min = 1))]
    ticket_type: Option<String>,
    #[validate(range(min = 0.0))]
    price: Option<f64>,
    // Правка ёмкости организатором; независима от текущих броней
    #[validate(range(min = 0))]
    availability: Option<i32>,
}

async fn update_ticket(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(ticket_id): Path<i64>,
    Json(req): Json<UpdateTicketRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;

    let organizer_id = access::organizer_profile_id(&state.db.pool, &user).await?;
    let event_id =
        access::require_ticket_owner_masked(&state.db.pool, ticket_id, organizer_id).await?;

    let mut sets: Vec<String> = vec!["updated_at = NOW()".to_string()];
    let mut bind_idx = 1;
    if req.ticket_type.is_some() {
        sets.push(format!("ticket_type = ${}", bind_idx));
        bind_idx += 1;
    }
    if req.price.is_some() {
        sets.push(format!("price = ${}", bind_idx));
        bind_idx += 1;
    }
    if req.availability.is_some() {
        sets.push(format!("availability = ${}", bind_idx));
        bind_idx += 1;
    }

    let q = format!(
        "UPDATE tickets SET {} WHERE id = ${} RETURNING *",
        sets.join(", "),
        bind_idx
    );

    let mut dbq = sqlx::query_as::<_, Ticket>(&q);
    if let Some(ticket_type) = req.ticket_type {
        dbq = dbq.bind(ticket_type);
    }
    if let Some(price) = req.price {
        dbq = dbq.bind(price);
    }
    if let Some(availability) = req.availability {
        dbq = dbq.bind(availability);
    }

    let ticket = dbq.bind(ticket_id).fetch_one(&state.db.pool).await?;

    state.cache.invalidate_tickets(event_id).await;

    Ok(Json(ticket))
}

/* ---------- БРОНИ СОБЫТИЯ ---------- */

// GET /api/events/{id}/bookings - только для организатора события
async fn list_event_bookings(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(event_id): Path<i64>,
) -> Result<Json<Vec<Booking>>, ApiError> {
    let organizer_id = access::organizer_profile_id(&state.db.pool, &user).await?;
    access::require_event_owner_masked(&state.db.pool, event_id, organizer_id).await?;

    let bookings: Vec<Booking> = sqlx::query_as(
        "SELECT * FROM bookings WHERE event_id = $1 ORDER BY created_at DESC",
    )
    .bind(event_id)
    .fetch_all(&state.db.pool)
    .await?;

    Ok(Json(bookings))
}
