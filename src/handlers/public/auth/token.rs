// handlers/public/auth/token.rs - Header-mode token endpoints
//
// POST /auth/token/          {email, password} -> {access, refresh}
// POST /auth/token/refresh/  {refresh}         -> {access, refresh?}
// POST /auth/token/verify/   {token}           -> {}

use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use super::utils::{authenticate, exchange_refresh, LoginRequest};
use crate::auth::{JwtError, TokenPair, TokenType};
use crate::error::ApiError;
use crate::middleware::RequestMeta;
use crate::server::AppState;

pub async fn token_obtain(
    State(state): State<AppState>,
    meta: RequestMeta,
    Json(req): Json<LoginRequest>,
) -> Result<Json<TokenPair>, ApiError> {
    let (_, pair) = authenticate(&state, &req, &meta).await?;
    Ok(Json(pair))
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh: String,
}

pub async fn token_refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<Value>, ApiError> {
    if req.refresh.trim().is_empty() {
        return Err(ApiError::field_error("refresh", "This field is required."));
    }

    let refreshed = exchange_refresh(&state, req.refresh.trim()).await?;
    let mut body = json!({ "access": refreshed.access });
    if let Some(refresh) = refreshed.refresh {
        body["refresh"] = Value::String(refresh);
    }
    Ok(Json(body))
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    #[serde(default)]
    pub token: String,
}

/// Accepts either token type; blacklisted refresh tokens fail
pub async fn token_verify(
    State(state): State<AppState>,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<Value>, ApiError> {
    let token = req.token.trim();
    if token.is_empty() {
        return Err(ApiError::field_error("token", "This field is required."));
    }

    let claims = match state.tokens.validate(token, TokenType::Access) {
        Ok(claims) => claims,
        Err(JwtError::WrongTokenType { .. }) => state.tokens.validate(token, TokenType::Refresh)?,
        Err(e) => return Err(e.into()),
    };
    if state.store.is_token_blacklisted(&claims.jti).await? {
        return Err(JwtError::Blacklisted.into());
    }

    Ok(Json(json!({})))
}
