use axum::http::{header, HeaderMap};
use axum_extra::extract::cookie::{Cookie, SameSite};
use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};

use crate::auth::{token_fingerprint, verify_password, JwtError, TokenPair, TokenType};
use crate::database::models::{ActivityResult, User};
use crate::database::DatabaseError;
use crate::error::ApiError;
use crate::middleware::RequestMeta;
use crate::server::AppState;
use crate::types::Operation;

pub const REFRESH_COOKIE_NAME: &str = "refresh_token";
pub const REFRESH_COOKIE_PATH: &str = "/auth/";

const BAD_CREDENTIALS: &str = "No active account found with the given credentials";

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Check credentials, record the login and hand out a fresh pair
pub async fn authenticate(
    state: &AppState,
    req: &LoginRequest,
    meta: &RequestMeta,
) -> Result<(User, TokenPair), ApiError> {
    let email = req.email.trim().to_lowercase();
    if email.is_empty() || req.password.is_empty() {
        let mut errors = std::collections::HashMap::new();
        if email.is_empty() {
            errors.insert("email".to_string(), "This field is required.".to_string());
        }
        if req.password.is_empty() {
            errors.insert("password".to_string(), "This field is required.".to_string());
        }
        return Err(ApiError::validation_error("Invalid field values", Some(errors)));
    }

    let user = match state.store.find_user_by_email(&email).await? {
        Some(user) if user.is_active && verify_password(&req.password, &user.password_hash) => user,
        _ => {
            warn!("Failed login for {}", email);
            state
                .audit
                .record(None, "auth", Operation::Access, None, ActivityResult::Invalid, format!("Failed login for {}", email), meta.ip.clone())
                .await;
            return Err(ApiError::unauthorized(BAD_CREDENTIALS));
        }
    };

    let pair = state.tokens.issue_pair(&user)?;

    let mut updated = user.clone();
    updated.last_login = Some(Utc::now());
    let user = state.store.update_user(&updated).await?;

    if let Err(e) = state
        .store
        .record_login(&user, meta.ip.clone(), meta.user_agent.clone())
        .await
    {
        warn!("Failed to record login activity for {}: {}", user.email, e);
    }

    info!("User {} logged in (refresh {})", user.email, token_fingerprint(&pair.refresh));
    Ok((user, pair))
}

/// Result of exchanging a refresh token
#[derive(Debug)]
pub struct Refreshed {
    pub access: String,
    /// Present when rotation is enabled
    pub refresh: Option<String>,
}

/// Validate a refresh token and issue a new access token, rotating the refresh token when configured
pub async fn exchange_refresh(state: &AppState, raw: &str) -> Result<Refreshed, ApiError> {
    let claims = state.tokens.validate(raw, TokenType::Refresh)?;
    if state.store.is_token_blacklisted(&claims.jti).await? {
        return Err(JwtError::Blacklisted.into());
    }

    let user = match state.store.get_user(claims.user_id).await {
        Ok(user) if user.is_active => user,
        Ok(_) | Err(DatabaseError::NotFound(_)) => return Err(ApiError::unauthorized("User not found")),
        Err(e) => return Err(e.into()),
    };

    let security = &state.config.security;
    if !security.rotate_refresh_tokens {
        return Ok(Refreshed {
            access: state.tokens.issue(&user, TokenType::Access)?,
            refresh: None,
        });
    }

    if security.blacklist_after_rotation {
        state.store.blacklist_token(&claims.jti, claims.expires_at()).await?;
    }

    let pair = state.tokens.issue_pair(&user)?;
    info!(
        "Rotated refresh token for {} ({} -> {})",
        user.email,
        token_fingerprint(raw),
        token_fingerprint(&pair.refresh)
    );
    Ok(Refreshed {
        access: pair.access,
        refresh: Some(pair.refresh),
    })
}

/// Blacklist a refresh token if it is still valid; anything else is ignored
pub async fn revoke_refresh(state: &AppState, raw: &str) {
    match state.tokens.validate(raw, TokenType::Refresh) {
        Ok(claims) => {
            if let Err(e) = state.store.blacklist_token(&claims.jti, claims.expires_at()).await {
                warn!("Failed to blacklist refresh token {}: {}", token_fingerprint(raw), e);
            }
        }
        Err(e) => info!("Ignoring unusable refresh token on logout: {}", e),
    }
}

fn request_host(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(|h| h.split(':').next().unwrap_or_default().to_ascii_lowercase())
}

fn is_local_request(headers: &HeaderMap) -> bool {
    matches!(request_host(headers).as_deref(), Some("127.0.0.1") | Some("localhost"))
}

/// httpOnly refresh cookie; Lax over plain HTTP locally, Secure + SameSite=None elsewhere
pub fn refresh_cookie(state: &AppState, headers: &HeaderMap, value: String) -> Cookie<'static> {
    let max_age = time::Duration::seconds(state.tokens.refresh_ttl().num_seconds());
    let builder = Cookie::build((REFRESH_COOKIE_NAME, value))
        .http_only(true)
        .path(REFRESH_COOKIE_PATH)
        .max_age(max_age);

    if is_local_request(headers) {
        return builder.secure(false).same_site(SameSite::Lax).build();
    }

    let builder = builder.secure(true).same_site(SameSite::None);
    match state.config.security.cookie_domain.clone() {
        Some(domain) => builder.domain(domain).build(),
        None => builder.build(),
    }
}

pub fn refresh_cookie_removal() -> Cookie<'static> {
    Cookie::build(REFRESH_COOKIE_NAME).path(REFRESH_COOKIE_PATH).build()
}
