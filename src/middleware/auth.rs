use std::convert::Infallible;
use std::net::SocketAddr;

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};

use crate::auth::TokenType;
use crate::database::models::User;
use crate::database::DatabaseError;
use crate::error::ApiError;
use crate::server::AppState;

/// Authenticated user context, loaded from the store on every request
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub user: User,
    pub jti: String,
}

impl AuthUser {
    pub fn id(&self) -> i64 {
        self.user.id
    }

    pub fn is_admin(&self) -> bool {
        self.user.is_admin()
    }

    pub fn is_admin_or_dpo(&self) -> bool {
        self.user.is_admin() || self.user.is_dpo()
    }
}

/// JWT authentication middleware that validates tokens and extracts user context
pub async fn jwt_auth_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_jwt_from_headers(&headers).map_err(ApiError::unauthorized)?;
    let claims = state.tokens.validate(&token, TokenType::Access)?;

    let user = match state.store.get_user(claims.user_id).await {
        Ok(user) => user,
        Err(DatabaseError::NotFound(_)) => return Err(ApiError::unauthorized("User not found")),
        Err(e) => return Err(e.into()),
    };
    if !user.is_active {
        return Err(ApiError::unauthorized("User account is disabled"));
    }

    request.extensions_mut().insert(AuthUser { user, jti: claims.jti });
    Ok(next.run(request).await)
}

/// Extract JWT token from Authorization header
pub(crate) fn extract_jwt_from_headers(headers: &HeaderMap) -> Result<String, String> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| "Authentication credentials were not provided.".to_string())?;

    let auth_str = auth_header
        .to_str()
        .map_err(|_| "Invalid Authorization header format".to_string())?;

    if let Some(token) = auth_str.strip_prefix("Bearer ") {
        if token.trim().is_empty() {
            return Err("Empty JWT token".to_string());
        }
        Ok(token.trim().to_string())
    } else {
        Err("Authorization header must use Bearer token format".to_string())
    }
}

/// Client address and user agent, for login and audit records
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for RequestMeta {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header_str = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let forwarded = header_str("x-forwarded-for")
            .and_then(|v| v.split(',').next().map(|s| s.trim().to_string()));
        let ip = forwarded
            .or_else(|| header_str("x-real-ip"))
            .or_else(|| {
                parts
                    .extensions
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip().to_string())
            });

        Ok(RequestMeta {
            ip,
            user_agent: header_str("user-agent"),
        })
    }
}
