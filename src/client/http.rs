//! Authenticated JSON client.
//!
//! Every request carries `Authorization: Bearer <access>`. A 401 leads to at
//! most one retry: with the token another task already stored, or with the
//! result of the shared refresh. A failed refresh clears the tokens and
//! raises the reauthentication event.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::{Method, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};
use url::Url;

use super::claims::decode_unverified;
use super::events::{ReauthReason, SessionEvents};
use super::refresh::RefreshCoordinator;
use super::tokens::TokenStore;
use super::{ClientError, RefreshError};
use crate::auth::token_fingerprint;
use crate::config::{normalize_base_url, ClientConfig};

/// Where the refresh token lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Both tokens in the token store; refresh posts the refresh token in the body
    #[default]
    Header,
    /// Refresh token in the httpOnly cookie held by the HTTP client
    Cookie,
}

impl AuthMode {
    pub fn login_path(&self) -> &'static str {
        match self {
            AuthMode::Header => "auth/token/",
            AuthMode::Cookie => "auth/login/",
        }
    }

    pub fn refresh_path(&self) -> &'static str {
        match self {
            AuthMode::Header => "auth/token/refresh/",
            AuthMode::Cookie => "auth/refresh/",
        }
    }
}

struct Inner {
    http: reqwest::Client,
    cookies: Arc<Jar>,
    base: Url,
    mode: AuthMode,
    tokens: Arc<dyn TokenStore>,
    refresher: RefreshCoordinator<String>,
    refresh_calls: AtomicUsize,
    events: SessionEvents,
}

#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<Inner>,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access: Option<String>,
    #[serde(default)]
    refresh: Option<String>,
}

impl ApiClient {
    pub fn new(
        base_url: &str,
        mode: AuthMode,
        tokens: Arc<dyn TokenStore>,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let base = Url::parse(&normalize_base_url(base_url))
            .map_err(|e| ClientError::Decode(format!("invalid base URL {}: {}", base_url, e)))?;
        let cookies = Arc::new(Jar::default());
        let http = reqwest::Client::builder()
            .cookie_provider(Arc::clone(&cookies))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            inner: Arc::new(Inner {
                http,
                cookies,
                base,
                mode,
                tokens,
                refresher: RefreshCoordinator::new(),
                refresh_calls: AtomicUsize::new(0),
                events: SessionEvents::new(),
            }),
        })
    }

    pub fn from_config(config: &ClientConfig, tokens: Arc<dyn TokenStore>) -> Result<Self, ClientError> {
        let mode = if config.cookie_mode { AuthMode::Cookie } else { AuthMode::Header };
        Self::new(&config.api_url, mode, tokens, config.request_timeout())
    }

    pub fn mode(&self) -> AuthMode {
        self.inner.mode
    }

    pub fn base_url(&self) -> &Url {
        &self.inner.base
    }

    pub fn tokens(&self) -> &Arc<dyn TokenStore> {
        &self.inner.tokens
    }

    pub fn events(&self) -> &SessionEvents {
        &self.inner.events
    }

    /// Refresh calls that actually reached the server
    pub fn refresh_count(&self) -> usize {
        self.inner.refresh_calls.load(Ordering::SeqCst)
    }

    fn url(&self, path: &str) -> Result<Url, ClientError> {
        self.inner
            .base
            .join(path.trim_start_matches('/'))
            .map_err(|e| ClientError::Decode(format!("invalid path {}: {}", path, e)))
    }

    /// URL the refresh cookie is scoped to
    fn cookie_scope(&self) -> Result<Url, ClientError> {
        self.url("auth/")
    }

    /// Seeds the cookie jar from the token store when this client has not
    /// seen the refresh cookie yet (a new CLI process, say)
    pub(crate) async fn restore_refresh_cookie(&self) -> Result<(), ClientError> {
        if self.inner.mode != AuthMode::Cookie {
            return Ok(());
        }
        let scope = self.cookie_scope()?;
        if self.inner.cookies.cookies(&scope).is_some() {
            return Ok(());
        }
        let Some(stored) = self.inner.tokens.refresh_cookie().await else {
            return Ok(());
        };
        for pair in stored.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            self.inner
                .cookies
                .add_cookie_str(&format!("{}; Path={}", pair, scope.path()), &scope);
        }
        debug!("Restored refresh cookie for {}", scope);
        Ok(())
    }

    /// Copies the refresh cookie from the jar into the token store
    pub(crate) async fn save_refresh_cookie(&self) -> Result<(), ClientError> {
        if self.inner.mode != AuthMode::Cookie {
            return Ok(());
        }
        let scope = self.cookie_scope()?;
        let current = self
            .inner
            .cookies
            .cookies(&scope)
            .and_then(|header| header.to_str().ok().map(str::to_string));
        self.inner.tokens.set_refresh_cookie(current).await
    }

    async fn dispatch(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        access: Option<&str>,
    ) -> Result<Response, ClientError> {
        let mut request = self.inner.http.request(method, self.url(path)?);
        if let Some(token) = access {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(request.send().await?)
    }

    async fn decode(response: Response) -> Result<Value, ClientError> {
        let status = response.status();
        let bytes = response.bytes().await?;
        let body: Value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).map_err(|e| {
                if status.is_success() {
                    ClientError::Decode(e.to_string())
                } else {
                    ClientError::Decode(format!("HTTP {} with non-JSON body", status.as_u16()))
                }
            })?
        };

        if status.is_success() {
            Ok(body)
        } else {
            Err(ClientError::from_response(status.as_u16(), body))
        }
    }

    /// Authenticated request with the 401 retry
    pub async fn request(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value, ClientError> {
        let mut sent = self.inner.tokens.access().await;

        // Skip the round trip when the stored token is known to be expired
        if sent
            .as_deref()
            .and_then(decode_unverified)
            .is_some_and(|c| c.is_expired(Utc::now()))
        {
            debug!("Access token expired before {} {}", method, path);
            sent = Some(self.refresh_stale(sent.as_deref()).await?);
        }

        let response = self.dispatch(method.clone(), path, body, sent.as_deref()).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Self::decode(response).await;
        }

        let token = self.refresh_stale(sent.as_deref()).await?;
        debug!("Retrying {} {} after refresh", method, path);
        let response = self.dispatch(method, path, body, Some(&token)).await?;
        Self::decode(response).await
    }

    /// Unauthenticated request, no retry (login, logout)
    pub async fn request_public(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value, ClientError> {
        let response = self.dispatch(method, path, body, None).await?;
        Self::decode(response).await
    }

    pub async fn get(&self, path: &str) -> Result<Value, ClientError> {
        self.request(Method::GET, path, None).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<Value, ClientError> {
        self.request(Method::POST, path, Some(body)).await
    }

    pub async fn put(&self, path: &str, body: &Value) -> Result<Value, ClientError> {
        self.request(Method::PUT, path, Some(body)).await
    }

    pub async fn patch(&self, path: &str, body: &Value) -> Result<Value, ClientError> {
        self.request(Method::PATCH, path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value, ClientError> {
        self.request(Method::DELETE, path, None).await
    }

    /// A fresh access token, given the one the caller last used.
    ///
    /// If another task already replaced `seen`, its token is returned without a
    /// refresh; otherwise the caller joins the single in-flight refresh.
    pub async fn refresh_stale(&self, seen: Option<&str>) -> Result<String, ClientError> {
        if let Some(current) = self.fresher_than(seen).await {
            return Ok(current);
        }
        self.force_refresh(seen).await
    }

    async fn fresher_than(&self, seen: Option<&str>) -> Option<String> {
        let current = self.inner.tokens.access().await?;
        let replaced = seen != Some(current.as_str());
        let usable = decode_unverified(&current).map_or(true, |c| !c.is_expired(Utc::now()));
        (replaced && usable).then_some(current)
    }

    /// Refresh now if the stored access token expires within `skew`.
    /// Returns whether a refresh happened.
    pub async fn ensure_fresh(&self, skew: Duration) -> Result<bool, ClientError> {
        let current = self.inner.tokens.access().await;
        let due = match current.as_deref().and_then(decode_unverified) {
            Some(claims) => claims.expires_within(skew, Utc::now()),
            // Cookie mode can mint an access token from the cookie alone
            None => self.inner.mode == AuthMode::Cookie || self.inner.tokens.refresh().await.is_some(),
        };
        if !due {
            return Ok(false);
        }
        self.force_refresh(current.as_deref()).await.map(|_| true)
    }

    /// Refresh even if the stored token still looks valid
    pub async fn force_refresh(&self, seen: Option<&str>) -> Result<String, ClientError> {
        let seen = seen.map(str::to_string);
        self.inner
            .refresher
            .run(|| async move {
                // A flight that finished between the caller's check and its turn
                if let Some(current) = self.fresher_than(seen.as_deref()).await {
                    return Ok(current);
                }
                match self.perform_refresh().await {
                    Ok(access) => Ok(access),
                    Err(e) => {
                        warn!("Token refresh failed: {}", e);
                        self.clear_tokens().await;
                        self.inner.events.reauth_required(ReauthReason::SessionExpired);
                        Err(e)
                    }
                }
            })
            .await
            .map_err(|cause| ClientError::ReauthRequired {
                message: ReauthReason::SessionExpired.message().to_string(),
                cause: Some(cause),
            })
    }

    async fn perform_refresh(&self) -> Result<String, RefreshError> {
        let mode = self.inner.mode;
        let body = match mode {
            AuthMode::Header => {
                let refresh = self
                    .inner
                    .tokens
                    .refresh()
                    .await
                    .ok_or(RefreshError::MissingRefreshToken)?;
                Some(json!({ "refresh": refresh }))
            }
            AuthMode::Cookie => {
                self.restore_refresh_cookie()
                    .await
                    .map_err(|e| RefreshError::Storage(e.to_string()))?;
                None
            }
        };

        self.inner.refresh_calls.fetch_add(1, Ordering::SeqCst);
        let response = self
            .dispatch(Method::POST, mode.refresh_path(), body.as_ref(), None)
            .await
            .map_err(|e| RefreshError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body: Value = response.json().await.unwrap_or(Value::Null);
            let message = match ClientError::from_response(status.as_u16(), body) {
                ClientError::Auth { message, .. } | ClientError::Api { message, .. } => message,
                other => other.to_string(),
            };
            return Err(RefreshError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: RefreshResponse = response.json().await.map_err(|_| RefreshError::InvalidResponse)?;
        let access = parsed
            .access
            .filter(|a| !a.is_empty())
            .ok_or(RefreshError::InvalidResponse)?;

        let tokens = &self.inner.tokens;
        tokens
            .set_access(Some(access.clone()))
            .await
            .map_err(|e| RefreshError::Storage(e.to_string()))?;
        match mode {
            AuthMode::Header => {
                if let Some(rotated) = parsed.refresh.filter(|r| !r.is_empty()) {
                    tokens
                        .set_refresh(Some(rotated))
                        .await
                        .map_err(|e| RefreshError::Storage(e.to_string()))?;
                }
            }
            AuthMode::Cookie => self
                .save_refresh_cookie()
                .await
                .map_err(|e| RefreshError::Storage(e.to_string()))?,
        }

        debug!("Refreshed access token {}", token_fingerprint(&access));
        Ok(access)
    }

    async fn clear_tokens(&self) {
        if let Err(e) = self.inner.tokens.clear().await {
            warn!("Failed to clear stored tokens: {}", e);
        }
    }

    /// Drop the tokens and tell the shell to send the user back to login
    pub async fn force_logout(&self, reason: ReauthReason) {
        self.clear_tokens().await;
        self.inner.events.reauth_required(reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tokens::MemoryTokenStore;

    fn client(mode: AuthMode) -> ApiClient {
        ApiClient::new(
            "http://127.0.0.1:9/api",
            mode,
            Arc::new(MemoryTokenStore::new()),
            Duration::from_secs(1),
        )
        .unwrap()
    }

    #[test]
    fn paths_join_under_the_base() {
        let c = client(AuthMode::Header);
        assert_eq!(c.url("users/me/").unwrap().as_str(), "http://127.0.0.1:9/api/users/me/");
        assert_eq!(c.url("/riscos/").unwrap().as_str(), "http://127.0.0.1:9/api/riscos/");
    }

    #[test]
    fn mode_selects_endpoints() {
        assert_eq!(AuthMode::Header.refresh_path(), "auth/token/refresh/");
        assert_eq!(AuthMode::Cookie.refresh_path(), "auth/refresh/");
        assert_eq!(AuthMode::Cookie.login_path(), "auth/login/");
    }

    #[tokio::test]
    async fn header_refresh_without_refresh_token_forces_logout() {
        let c = client(AuthMode::Header);
        c.tokens().set_access(Some("stale".into())).await.unwrap();
        let mut events = c.events().subscribe();

        let err = c.refresh_stale(Some("stale")).await.unwrap_err();
        match err {
            ClientError::ReauthRequired { cause, .. } => {
                assert_eq!(cause, Some(RefreshError::MissingRefreshToken))
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(c.tokens().access().await, None);
        assert!(events.try_recv().is_ok());
    }

    #[tokio::test]
    async fn refresh_cookie_moves_between_clients_through_the_store() {
        let tokens: Arc<dyn TokenStore> = Arc::new(MemoryTokenStore::new());
        let first = ApiClient::new("http://127.0.0.1:9/api", AuthMode::Cookie, Arc::clone(&tokens), Duration::from_secs(1))
            .unwrap();
        let scope = first.cookie_scope().unwrap();
        first
            .inner
            .cookies
            .add_cookie_str("refresh_token=r1; Path=/api/auth/; HttpOnly", &scope);
        first.save_refresh_cookie().await.unwrap();
        assert_eq!(tokens.refresh_cookie().await.as_deref(), Some("refresh_token=r1"));

        let second = ApiClient::new("http://127.0.0.1:9/api", AuthMode::Cookie, tokens, Duration::from_secs(1)).unwrap();
        second.restore_refresh_cookie().await.unwrap();
        let sent = second.inner.cookies.cookies(&second.url("auth/refresh/").unwrap());
        assert_eq!(sent.as_ref().and_then(|h| h.to_str().ok()), Some("refresh_token=r1"));
    }

    #[tokio::test]
    async fn header_mode_never_stores_a_cookie() {
        let c = client(AuthMode::Header);
        c.save_refresh_cookie().await.unwrap();
        assert_eq!(c.tokens().refresh_cookie().await, None);
    }

    #[tokio::test]
    async fn token_replaced_by_another_task_is_reused() {
        let c = client(AuthMode::Header);
        c.tokens().set_access(Some("newer".into())).await.unwrap();
        assert_eq!(c.refresh_stale(Some("older")).await.unwrap(), "newer");
        assert_eq!(c.refresh_count(), 0);
    }
}
