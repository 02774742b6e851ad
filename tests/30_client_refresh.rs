mod common;

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use futures::future::join_all;
use serde_json::Value;

use camaleao::auth::{Claims, TokenType};
use camaleao::client::{
    ApiClient, AuthMode, ClientError, FileTokenStore, ReauthReason, Session, SessionEvent, TokenStore,
};
use common::{TestServer, DPO, GERENTE};

const CONCURRENT: usize = 8;

/// Access token for `email` that expired a minute ago
async fn expired_access(server: &TestServer, email: &str) -> Result<String> {
    let user = server
        .state
        .store
        .find_user_by_email(email)
        .await?
        .context("user not seeded")?;
    let now = Utc::now().timestamp();
    let claims = Claims {
        token_type: TokenType::Access,
        jti: uuid::Uuid::new_v4().simple().to_string(),
        user_id: user.id,
        email: user.email.clone(),
        first_name: user.first_name.clone(),
        role: user.role.as_str().to_string(),
        exp: now - 60,
        iat: now - 360,
    };
    Ok(server.state.tokens.sign(&claims)?)
}

/// Header-mode client holding an expired access token and a valid refresh token
async fn stale_header_client(server: &TestServer, email: &str) -> Result<ApiClient> {
    let pair = server.login(email).await?;
    let client = server.client(AuthMode::Header)?;
    client.tokens().set_access(Some(expired_access(server, email).await?)).await?;
    client
        .tokens()
        .set_refresh(pair["refresh"].as_str().map(str::to_string))
        .await?;
    Ok(client)
}

async fn fan_out(client: &ApiClient, path: &str) -> Vec<Result<Value, ClientError>> {
    join_all((0..CONCURRENT).map(|_| {
        let client = client.clone();
        let path = path.to_string();
        async move { client.get(&path).await }
    }))
    .await
}

#[tokio::test]
async fn concurrent_requests_share_one_refresh() -> Result<()> {
    let server = TestServer::start().await?;
    let client = stale_header_client(&server, DPO).await?;
    let old_refresh = client.tokens().refresh().await;

    let results = fan_out(&client, "riscos/").await;
    for result in &results {
        assert!(result.is_ok(), "request failed: {:?}", result);
    }
    assert_eq!(client.refresh_count(), 1);

    // The rotated refresh token replaced the spent one
    let new_refresh = client.tokens().refresh().await;
    assert!(new_refresh.is_some());
    assert_ne!(new_refresh, old_refresh);
    Ok(())
}

#[tokio::test]
async fn unreadable_tokens_refresh_once_after_401() -> Result<()> {
    let server = TestServer::start().await?;
    let client = stale_header_client(&server, GERENTE).await?;
    // Not a JWT, so the client only learns it is stale from the server
    client.tokens().set_access(Some("garbage".into())).await?;

    let results = fan_out(&client, "users/me/").await;
    for result in &results {
        let me = result.as_ref().map_err(|e| anyhow::anyhow!("{}", e))?;
        assert_eq!(me["email"], GERENTE);
    }
    assert_eq!(client.refresh_count(), 1);
    Ok(())
}

#[tokio::test]
async fn failed_refresh_fails_every_waiter_and_logs_out() -> Result<()> {
    let server = TestServer::start().await?;
    let client = stale_header_client(&server, DPO).await?;
    let mut events = client.events().subscribe();

    // Revoke the refresh token behind the client's back
    let refresh = client.tokens().refresh().await.unwrap_or_default();
    reqwest::Client::new()
        .post(server.url("auth/logout/"))
        .json(&serde_json::json!({ "refresh": refresh }))
        .send()
        .await?
        .error_for_status()?;

    let results = fan_out(&client, "riscos/").await;
    for result in &results {
        match result {
            Err(e) => assert!(e.is_reauth_required(), "unexpected error: {}", e),
            Ok(v) => panic!("request unexpectedly succeeded: {}", v),
        }
    }
    assert_eq!(client.refresh_count(), 1);

    assert!(client.tokens().access().await.is_none());
    assert!(client.tokens().refresh().await.is_none());

    let SessionEvent::ReauthRequired { reason, .. } = events.recv().await?;
    assert_eq!(reason, ReauthReason::SessionExpired);
    Ok(())
}

#[tokio::test]
async fn cookie_mode_refreshes_from_the_cookie() -> Result<()> {
    let server = TestServer::start().await?;
    let session = server.session(AuthMode::Cookie, DPO).await?;
    let client = session.client().clone();

    assert!(client.tokens().refresh().await.is_none());
    client.tokens().set_access(Some(expired_access(&server, DPO).await?)).await?;

    let results = fan_out(&client, "users/me/").await;
    for result in &results {
        assert!(result.is_ok(), "request failed: {:?}", result);
    }
    assert_eq!(client.refresh_count(), 1);
    Ok(())
}

#[tokio::test]
async fn ensure_fresh_only_refreshes_when_due() -> Result<()> {
    let server = TestServer::start().await?;
    let session = server.session(AuthMode::Header, GERENTE).await?;
    let client = session.client();

    assert!(!client.ensure_fresh(std::time::Duration::from_secs(30)).await?);
    assert_eq!(client.refresh_count(), 0);

    // The access token lives for five minutes, so a larger skew makes it due
    assert!(client.ensure_fresh(std::time::Duration::from_secs(600)).await?);
    assert_eq!(client.refresh_count(), 1);
    Ok(())
}

#[tokio::test]
async fn stores_are_shared_between_clients() -> Result<()> {
    let server = TestServer::start().await?;
    let session = server.session(AuthMode::Header, DPO).await?;
    let tokens = Arc::clone(session.client().tokens());

    let other = server.client_with(AuthMode::Header, tokens)?;
    let me = other.get("users/me/").await?;
    assert_eq!(me["email"], DPO);
    Ok(())
}

/// A client on the token file, as a fresh CLI invocation would build it
async fn client_on_file(server: &TestServer, path: &std::path::Path) -> Result<ApiClient> {
    let tokens: Arc<dyn TokenStore> = Arc::new(FileTokenStore::open(path).await);
    Ok(server.client_with(AuthMode::Cookie, tokens)?)
}

#[tokio::test]
async fn cookie_login_survives_a_new_client() -> Result<()> {
    let server = TestServer::start().await?;
    let dir = std::env::temp_dir().join(format!("camaleao-cookie-{}", uuid::Uuid::new_v4().simple()));
    let path = dir.join("tokens.json");

    Session::new(client_on_file(&server, &path).await?).login(DPO, common::PASSWORD).await?;

    let next = client_on_file(&server, &path).await?;
    assert!(next.tokens().refresh().await.is_none());
    let seen = next.tokens().access().await;
    assert!(seen.is_some());
    next.force_refresh(seen.as_deref()).await?;
    assert_eq!(next.refresh_count(), 1);
    assert_ne!(next.tokens().access().await, seen);

    // The rotated cookie was written back, so a third run refreshes too
    let third = client_on_file(&server, &path).await?;
    let seen = third.tokens().access().await;
    third.force_refresh(seen.as_deref()).await?;
    assert_eq!(third.refresh_count(), 1);
    let me = third.get("users/me/").await?;
    assert_eq!(me["email"], DPO);

    let _ = tokio::fs::remove_dir_all(&dir).await;
    Ok(())
}

#[tokio::test]
async fn cookie_logout_from_a_new_client_revokes_the_cookie() -> Result<()> {
    let server = TestServer::start().await?;
    let dir = std::env::temp_dir().join(format!("camaleao-cookie-{}", uuid::Uuid::new_v4().simple()));
    let path = dir.join("tokens.json");

    Session::new(client_on_file(&server, &path).await?).login(GERENTE, common::PASSWORD).await?;
    let cookie = client_on_file(&server, &path)
        .await?
        .tokens()
        .refresh_cookie()
        .await
        .context("refresh cookie was not saved")?;

    Session::new(client_on_file(&server, &path).await?).logout().await?;
    assert!(!path.exists());

    // Replaying the saved cookie fails: logout blacklisted it
    let res = reqwest::Client::new()
        .post(server.url("auth/refresh/"))
        .header(reqwest::header::COOKIE, cookie)
        .send()
        .await?;
    assert_eq!(res.status(), reqwest::StatusCode::UNAUTHORIZED);

    let _ = tokio::fs::remove_dir_all(&dir).await;
    Ok(())
}
