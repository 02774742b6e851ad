// handlers/public/auth/cookie.rs - Cookie-mode login and refresh
//
// The refresh token travels in the httpOnly `refresh_token` cookie scoped to
// /auth/. Login still returns both tokens in the body.

use axum::{extract::State, http::HeaderMap, Json};
use axum_extra::extract::cookie::CookieJar;
use serde_json::{json, Value};

use super::utils::{authenticate, exchange_refresh, refresh_cookie, LoginRequest, REFRESH_COOKIE_NAME};
use crate::auth::TokenPair;
use crate::error::ApiError;
use crate::middleware::RequestMeta;
use crate::server::AppState;

pub async fn cookie_login(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    meta: RequestMeta,
    Json(req): Json<LoginRequest>,
) -> Result<(CookieJar, Json<TokenPair>), ApiError> {
    let (_, pair) = authenticate(&state, &req, &meta).await?;
    let jar = jar.add(refresh_cookie(&state, &headers, pair.refresh.clone()));
    Ok((jar, Json(pair)))
}

pub async fn cookie_refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<(CookieJar, Json<Value>), ApiError> {
    let raw = jar
        .get(REFRESH_COOKIE_NAME)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::unauthorized("Refresh token missing."))?;

    let refreshed = exchange_refresh(&state, &raw).await.map_err(|e| match e {
        ApiError::Unauthorized(_) => ApiError::unauthorized("Refresh token invalid."),
        other => other,
    })?;

    let jar = match refreshed.refresh {
        Some(rotated) => jar.add(refresh_cookie(&state, &headers, rotated)),
        None => jar,
    };
    Ok((jar, Json(json!({ "access": refreshed.access }))))
}
