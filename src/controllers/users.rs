use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use crate::errors::ApiError;
use crate::middleware::{issue_token, AuthUser};
use crate::models::{CustomerProfile, OrganizerProfile, Role, User};
use crate::services::access;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/users", post(register))
        .route("/users/token", post(login))
        .route("/users/me", get(me).patch(update_me))
        .route("/users/me/organizer-profile", post(create_organizer_profile))
        .route("/users/me/customer-profile", post(create_customer_profile))
}

/* ---------- РЕГИСТРАЦИЯ И ВХОД ---------- */

#[derive(Debug, Deserialize, Validate)]
struct RegisterRequest {
    #[validate(email)]
    email: String,
    #[validate(length(min = 8))]
    password: String,
    #[validate(length(min = 1))]
    name: String,
    // Роль выбирается ровно один раз, здесь
    role: Role,
}

#[derive(Debug, Serialize)]
struct UserResponse {
    user_id: i64,
    email: String,
    name: String,
    role: Role,
}

impl From<User> for UserResponse {
    fn from(u: User) -> Self {
        UserResponse {
            user_id: u.user_id,
            email: u.email,
            name: u.name,
            role: u.role,
        }
    }
}

async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;

    let password_hash = bcrypt::hash(&req.password, bcrypt::DEFAULT_COST)
        .map_err(|e| ApiError::Internal(format!("password hashing failed: {e}")))?;

    let user: User = sqlx::query_as(
        "INSERT INTO users (email, password_hash, name, role)
         VALUES ($1, $2, $3, $4)
         RETURNING *",
    )
    .bind(&req.email)
    .bind(&password_hash)
    .bind(&req.name)
    .bind(req.role)
    .fetch_one(&state.db.pool)
    .await?;

    tracing::info!(user_id = user.user_id, role = user.role.as_str(), "user registered");

    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct TokenResponse {
    token: String,
}

async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = User::find_by_email(&req.email, &state.db)
        .await?
        .ok_or(ApiError::Unauthorized)?;

    if !user.verify_password(&req.password) {
        return Err(ApiError::Unauthorized);
    }

    let token = issue_token(&state.config.jwt, &user)?;
    Ok(Json(TokenResponse { token }))
}

/* ---------- ТЕКУЩИЙ ПОЛЬЗОВАТЕЛЬ ---------- */

async fn me(user: AuthUser) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "user_id": user.user_id,
        "email": user.email,
        "name": user.name,
        "role": user.role,
    }))
}

#[derive(Debug, Deserialize, Validate)]
struct UpdateMeRequest {
    #[validate(length(min = 1))]
    name: Option<String>,
    #[validate(email)]
    email: Option<String>,
    #[validate(length(min = 8))]
    password: Option<String>,
    // Поле принимается только ради внятной ошибки: роль неизменяема
    role: Option<Role>,
}

async fn update_me(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<UpdateMeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;

    if req.role.is_some() {
        return Err(ApiError::RoleImmutable);
    }

    let password_hash = match &req.password {
        Some(p) => Some(
            bcrypt::hash(p, bcrypt::DEFAULT_COST)
                .map_err(|e| ApiError::Internal(format!("password hashing failed: {e}")))?,
        ),
        None => None,
    };

    // Собираем UPDATE только из переданных полей
    let mut sets: Vec<String> = Vec::new();
    let mut bind_idx = 1;
    if req.name.is_some() {
        sets.push(format!("name = ${}", bind_idx));
        bind_idx += 1;
    }
    if req.email.is_some() {
        sets.push(format!("email = ${}", bind_idx));
        bind_idx += 1;
    }
    if password_hash.is_some() {
        sets.push(format!("password_hash = ${}", bind_idx));
        bind_idx += 1;
    }

    if sets.is_empty() {
        return Err(ApiError::Validation("нет полей для обновления".to_string()));
    }

    let q = format!(
        "UPDATE users SET {} WHERE user_id = ${} RETURNING *",
        sets.join(", "),
        bind_idx
    );

    let mut dbq = sqlx::query_as::<_, User>(&q);
    if let Some(name) = req.name {
        dbq = dbq.bind(name);
    }
    if let Some(email) = req.email {
        dbq = dbq.bind(email);
    }
    if let Some(hash) = password_hash {
        dbq = dbq.bind(hash);
    }

    let updated = dbq.bind(user.user_id).fetch_one(&state.db.pool).await?;

    Ok(Json(UserResponse::from(updated)))
}

/* ---------- ПРОФИЛИ ---------- */

#[derive(Debug, Deserialize)]
struct OrganizerProfileRequest {
    company_name: Option<String>,
}

async fn create_organizer_profile(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<OrganizerProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    // Role-Gate: профиль организатора только для роли organizer,
    // никакая строка не создаётся при несовпадении
    access::ensure_role(&user, Role::Organizer)?;

    let profile: OrganizerProfile = sqlx::query_as(
        "INSERT INTO organizer_profiles (user_id, company_name)
         VALUES ($1, $2)
         RETURNING *",
    )
    .bind(user.user_id)
    .bind(&req.company_name)
    .fetch_one(&state.db.pool)
    .await?;

    Ok((StatusCode::CREATED, Json(profile)))
}

#[derive(Debug, Deserialize)]
struct CustomerProfileRequest {
    phone: Option<String>,
}

async fn create_customer_profile(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<CustomerProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    access::ensure_role(&user, Role::Customer)?;

    let profile: CustomerProfile = sqlx::query_as(
        "INSERT INTO customer_profiles (user_id, phone)
         VALUES ($1, $2)
         RETURNING *",
    )
    .bind(user.user_id)
    .bind(&req.phone)
    .fetch_one(&state.db.pool)
    .await?;

    Ok((StatusCode::CREATED, Json(profile)))
}
