#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio::task::JoinHandle;

use camaleao::auth::hash_password;
use camaleao::client::{ApiClient, AuthMode, MemoryTokenStore, Session, TokenStore};
use camaleao::config::AppConfig;
use camaleao::database::models::{NewUser, Role};
use camaleao::database::{MemoryStore, Store};
use camaleao::server::{app, seed_admin, AppState};

pub const PASSWORD: &str = "Str0ng!Passw0rd";
pub const ADMIN: &str = "admin@example.com";
pub const DPO: &str = "dpo@example.com";
pub const GERENTE: &str = "gerente@example.com";

/// API served in-process on a free port, backed by the memory store
pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    pub state: AppState,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub async fn start() -> Result<Self> {
        Self::start_with(AppConfig::for_tests()).await
    }

    pub async fn start_with(config: AppConfig) -> Result<Self> {
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}/", port);

        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        seed_admin(store.as_ref(), ADMIN, PASSWORD).await?;
        for (email, role, first_name) in [(DPO, Role::Dpo, "Dora"), (GERENTE, Role::Gerente, "Gil")] {
            let mut user = NewUser::new(email, hash_password(PASSWORD)?, role);
            user.first_name = first_name.into();
            store.create_user(user).await?;
        }

        let state = AppState::new(store, config);
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await?;
        let router = app(state.clone());
        let handle = tokio::spawn(async move {
            let service = router.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, service).await {
                eprintln!("test server stopped: {}", e);
            }
        });

        let server = Self { port, base_url, state, handle };
        server.wait_ready(Duration::from_secs(5)).await?;
        Ok(server)
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let client = reqwest::Client::new();
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if let Ok(resp) = client.get(self.url("health")).send().await {
                if resp.status() == StatusCode::OK {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Header-mode login; returns `{access, refresh}`
    pub async fn login(&self, email: &str) -> Result<Value> {
        let resp = reqwest::Client::new()
            .post(self.url("auth/token/"))
            .json(&json!({ "email": email, "password": PASSWORD }))
            .send()
            .await?;
        anyhow::ensure!(resp.status() == StatusCode::OK, "login for {} failed: {}", email, resp.status());
        Ok(resp.json().await?)
    }

    pub async fn access_token(&self, email: &str) -> Result<String> {
        let pair = self.login(email).await?;
        pair["access"]
            .as_str()
            .map(str::to_string)
            .context("login response has no access token")
    }

    pub fn client(&self, mode: AuthMode) -> Result<ApiClient> {
        self.client_with(mode, Arc::new(MemoryTokenStore::new()))
    }

    pub fn client_with(&self, mode: AuthMode, tokens: Arc<dyn TokenStore>) -> Result<ApiClient> {
        Ok(ApiClient::new(&self.base_url, mode, tokens, Duration::from_secs(10))?)
    }

    pub async fn session(&self, mode: AuthMode, email: &str) -> Result<Session> {
        let session = Session::new(self.client(mode)?);
        session.login(email, PASSWORD).await?;
        Ok(session)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Authenticated JSON request with a raw bearer token
pub async fn send(
    method: reqwest::Method,
    url: &str,
    token: &str,
    body: Option<&Value>,
) -> Result<(StatusCode, Value)> {
    let mut req = reqwest::Client::new().request(method, url).bearer_auth(token);
    if let Some(body) = body {
        req = req.json(body);
    }
    let resp = req.send().await?;
    let status = resp.status();
    let bytes = resp.bytes().await?;
    let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes)? };
    Ok((status, body))
}
