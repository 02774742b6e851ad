mod common;

use anyhow::Result;
use reqwest::{header, Method, StatusCode};
use serde_json::{json, Value};

use common::{send, TestServer, ADMIN, DPO, GERENTE, PASSWORD};

fn cookie_client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder().cookie_store(true).build()?)
}

#[tokio::test]
async fn health_endpoint_responds() -> Result<()> {
    let server = TestServer::start().await?;

    let res = reqwest::get(server.url("health")).await?;
    assert_eq!(res.status(), StatusCode::OK);

    let body: Value = res.json().await?;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], "memory");
    Ok(())
}

#[tokio::test]
async fn token_obtain_returns_a_pair() -> Result<()> {
    let server = TestServer::start().await?;

    let pair = server.login(DPO).await?;
    assert!(pair["access"].as_str().is_some_and(|t| !t.is_empty()));
    assert!(pair["refresh"].as_str().is_some_and(|t| !t.is_empty()));

    // Email is matched case-insensitively
    let res = reqwest::Client::new()
        .post(server.url("auth/token/"))
        .json(&json!({ "email": "  DPO@Example.com ", "password": PASSWORD }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn bad_credentials_are_rejected() -> Result<()> {
    let server = TestServer::start().await?;
    let client = reqwest::Client::new();

    let res = client
        .post(server.url("auth/token/"))
        .json(&json!({ "email": DPO, "password": "wrong" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await?;
    assert_eq!(body["error"], true);
    assert_eq!(body["message"], "No active account found with the given credentials");

    let res = client
        .post(server.url("auth/token/"))
        .json(&json!({ "email": "" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await?;
    assert_eq!(body["field_errors"]["email"], "This field is required.");
    assert_eq!(body["field_errors"]["password"], "This field is required.");
    Ok(())
}

#[tokio::test]
async fn refresh_rotates_and_blacklists_the_old_token() -> Result<()> {
    let server = TestServer::start().await?;
    let client = reqwest::Client::new();
    let pair = server.login(GERENTE).await?;

    let res = client
        .post(server.url("auth/token/refresh/"))
        .json(&json!({ "refresh": pair["refresh"] }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let rotated: Value = res.json().await?;
    assert!(rotated["access"].is_string());
    assert!(rotated["refresh"].is_string());
    assert_ne!(rotated["refresh"], pair["refresh"]);

    // The old refresh token is spent
    let res = client
        .post(server.url("auth/token/refresh/"))
        .json(&json!({ "refresh": pair["refresh"] }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    // An access token is not a refresh token
    let res = client
        .post(server.url("auth/token/refresh/"))
        .json(&json!({ "refresh": rotated["access"] }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .post(server.url("auth/token/refresh/"))
        .json(&json!({}))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn verify_accepts_live_tokens_only() -> Result<()> {
    let server = TestServer::start().await?;
    let client = reqwest::Client::new();
    let pair = server.login(DPO).await?;

    for token in [&pair["access"], &pair["refresh"]] {
        let res = client
            .post(server.url("auth/token/verify/"))
            .json(&json!({ "token": token }))
            .send()
            .await?;
        assert_eq!(res.status(), StatusCode::OK);
    }

    let res = client
        .post(server.url("auth/token/verify/"))
        .json(&json!({ "token": "not.a.jwt" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    // Logging out blacklists the refresh token, so verify fails afterwards
    client
        .post(server.url("auth/logout/"))
        .json(&json!({ "refresh": pair["refresh"] }))
        .send()
        .await?;
    let res = client
        .post(server.url("auth/token/verify/"))
        .json(&json!({ "token": pair["refresh"] }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn cookie_login_sets_an_http_only_refresh_cookie() -> Result<()> {
    let server = TestServer::start().await?;

    let res = reqwest::Client::new()
        .post(server.url("auth/login/"))
        .json(&json!({ "email": DPO, "password": PASSWORD }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);

    let cookie = res
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_default();
    assert!(cookie.starts_with("refresh_token="), "cookie: {}", cookie);
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("Path=/auth/"));
    assert!(cookie.contains("SameSite=Lax"));
    assert!(!cookie.contains("Secure"));

    let body: Value = res.json().await?;
    assert!(body["access"].is_string());
    Ok(())
}

#[tokio::test]
async fn cookie_refresh_needs_no_body() -> Result<()> {
    let server = TestServer::start().await?;
    let client = cookie_client()?;

    let res = client.post(server.url("auth/refresh/")).send().await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await?;
    assert_eq!(body["message"], "Refresh token missing.");

    client
        .post(server.url("auth/login/"))
        .json(&json!({ "email": GERENTE, "password": PASSWORD }))
        .send()
        .await?
        .error_for_status()?;

    // Two refreshes in a row: the rotated cookie replaces the spent one
    for _ in 0..2 {
        let res = client.post(server.url("auth/refresh/")).send().await?;
        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = res.json().await?;
        let access = body["access"].as_str().unwrap_or_default().to_string();
        assert!(body.get("refresh").is_none());

        let (status, me) = send(Method::GET, &server.url("users/me/"), &access, None).await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["email"], GERENTE);
    }
    Ok(())
}

#[tokio::test]
async fn cookie_logout_revokes_and_clears_the_cookie() -> Result<()> {
    let server = TestServer::start().await?;
    let client = cookie_client()?;

    client
        .post(server.url("auth/login/"))
        .json(&json!({ "email": DPO, "password": PASSWORD }))
        .send()
        .await?
        .error_for_status()?;

    let res = client.post(server.url("auth/logout/")).send().await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await?;
    assert_eq!(body["detail"], "OK");

    let res = client.post(server.url("auth/refresh/")).send().await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    // Logging out twice, or without any token, still succeeds
    let res = client.post(server.url("auth/logout/")).send().await?;
    assert_eq!(res.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn protected_routes_require_a_bearer_token() -> Result<()> {
    let server = TestServer::start().await?;

    let res = reqwest::get(server.url("riscos/")).await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await?;
    assert_eq!(body["message"], "Authentication credentials were not provided.");

    let pair = server.login(DPO).await?;
    let refresh = pair["refresh"].as_str().unwrap_or_default();
    let (status, _) = send(Method::GET, &server.url("riscos/"), refresh, None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn deactivated_users_lose_access() -> Result<()> {
    let server = TestServer::start().await?;
    let admin = server.access_token(ADMIN).await?;
    let pair = server.login(GERENTE).await?;
    let access = pair["access"].as_str().unwrap_or_default().to_string();

    let (_, me) = send(Method::GET, &server.url("users/me/"), &access, None).await?;
    let id = me["id"].as_i64().unwrap_or_default();

    let (status, body) = send(Method::DELETE, &server.url(&format!("users/{}/", id)), &admin, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["detail"], format!("User {} deactivated.", GERENTE));

    let (status, _) = send(Method::GET, &server.url("users/me/"), &access, None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let res = reqwest::Client::new()
        .post(server.url("auth/token/refresh/"))
        .json(&json!({ "refresh": pair["refresh"] }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    assert!(server.login(GERENTE).await.is_err());

    let (status, _) = send(
        Method::POST,
        &server.url(&format!("users/{}/reactivate/", id)),
        &admin,
        Some(&json!({})),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert!(server.login(GERENTE).await.is_ok());
    Ok(())
}

#[tokio::test]
async fn admins_cannot_deactivate_themselves() -> Result<()> {
    let server = TestServer::start().await?;
    let admin = server.access_token(ADMIN).await?;

    let (_, me) = send(Method::GET, &server.url("users/me/"), &admin, None).await?;
    let url = server.url(&format!("users/{}/", me["id"]));
    let (status, body) = send(Method::DELETE, &url, &admin, None).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "You cannot deactivate your own account.");
    Ok(())
}

#[tokio::test]
async fn logins_are_recorded() -> Result<()> {
    let server = TestServer::start().await?;
    server.login(DPO).await?;
    let admin = server.access_token(ADMIN).await?;

    let (status, body) = send(Method::GET, &server.url("login-activity/"), &admin, None).await?;
    assert_eq!(status, StatusCode::OK);
    let entries = body.as_array().cloned().unwrap_or_default();
    assert!(entries.len() >= 2);

    let gerente = server.access_token(GERENTE).await?;
    let (status, _) = send(Method::GET, &server.url("login-activity/"), &gerente, None).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    Ok(())
}
