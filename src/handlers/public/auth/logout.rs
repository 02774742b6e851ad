// handlers/public/auth/logout.rs - POST /auth/logout/
//
// Blacklists the refresh token from the cookie and/or the body and clears the
// cookie. Always answers {"detail": "OK"} so clients can log out offline-first.

use axum::{body::Bytes, extract::State, Json};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use serde_json::{json, Value};

use super::utils::{refresh_cookie_removal, revoke_refresh, REFRESH_COOKIE_NAME};
use crate::server::AppState;

#[derive(Debug, Default, Deserialize)]
struct LogoutRequest {
    #[serde(default)]
    refresh: Option<String>,
}

pub async fn logout(State(state): State<AppState>, jar: CookieJar, body: Bytes) -> (CookieJar, Json<Value>) {
    // The body is optional and may be empty or not JSON at all
    let req: LogoutRequest = serde_json::from_slice(&body).unwrap_or_default();

    let cookie_token = jar.get(REFRESH_COOKIE_NAME).map(|c| c.value().to_string());
    for raw in cookie_token.iter().chain(req.refresh.iter()) {
        if !raw.is_empty() {
            revoke_refresh(&state, raw).await;
        }
    }

    let jar = if cookie_token.is_some() {
        jar.remove(refresh_cookie_removal())
    } else {
        jar
    };
    (jar, Json(json!({ "detail": "OK" })))
}
