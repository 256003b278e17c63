use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::JwtConfig;
use crate::errors::ApiError;
use crate::models::{Role, User};

/// Аутентифицированный принципал текущего запроса.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: i64,
    pub email: String,
    pub name: String,
    pub role: Role,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub role: Role,
    pub exp: i64,
}

pub fn issue_token(config: &JwtConfig, user: &User) -> Result<String, ApiError> {
    let claims = Claims {
        sub: user.user_id,
        role: user.role,
        exp: (Utc::now() + Duration::hours(config.expires_in_hours)).timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )
    .map_err(|e| ApiError::Internal(format!("failed to sign token: {e}")))
}

pub fn decode_claims(config: &JwtConfig, token: &str) -> Result<Claims, ApiError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| ApiError::Unauthorized)
}

// Bearer JWT extractor
impl FromRequestParts<Arc<crate::AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<crate::AppState>,
    ) -> Result<Self, Self::Rejection> {
        // Получаем заголовок Authorization
        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(ApiError::Unauthorized)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(ApiError::Unauthorized)?;

        let claims = decode_claims(&state.config.jwt, token)?;

        // Токен может пережить деактивацию пользователя, поэтому строку
        // перечитываем из БД на каждом запросе
        let user: Option<User> = sqlx::query_as(
            "SELECT * FROM users WHERE user_id = $1 AND is_active = TRUE",
        )
        .bind(claims.sub)
        .fetch_optional(&state.db.pool)
        .await?;

        let user = user.ok_or(ApiError::Unauthorized)?;

        Ok(AuthUser {
            user_id: user.user_id,
            email: user.email,
            name: user.name,
            role: user.role,
        })
    }
}
