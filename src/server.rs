use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::{get, post},
    Extension, Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::auth::{hash_password, TokenService};
use crate::config::{AppConfig, SecurityConfig};
use crate::database::models::{NewUser, Role};
use crate::database::{DatabaseManager, Store};
use crate::handlers::{protected, public};
use crate::middleware::jwt_auth_middleware;
use crate::resources::Resource;
use crate::services::{AuditTrail, OverdueUpdater};

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: Arc<AppConfig>,
    pub tokens: TokenService,
    pub audit: AuditTrail,
    pub overdue: Arc<OverdueUpdater>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, config: AppConfig) -> Self {
        Self {
            tokens: TokenService::new(&config.security),
            audit: AuditTrail::new(store.clone(), config.security.enable_audit_logging),
            overdue: Arc::new(OverdueUpdater::new()),
            config: Arc::new(config),
            store,
        }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        // Public
        .route("/", get(public::root))
        .route("/health", get(public::health))
        .merge(auth_public_routes())
        // Protected
        .merge(protected_routes(state.clone()))
        // Global middleware
        .layer(cors_layer(&state.config.security))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn auth_public_routes() -> Router<AppState> {
    use public::auth;

    Router::new()
        // Header mode: tokens in the body
        .route("/auth/token/", post(auth::token_obtain))
        .route("/auth/token/refresh/", post(auth::token_refresh))
        .route("/auth/token/verify/", post(auth::token_verify))
        // Cookie mode: refresh token in an httpOnly cookie
        .route("/auth/login/", post(auth::cookie_login))
        .route("/auth/refresh/", post(auth::cookie_refresh))
        .route("/auth/logout/", post(auth::logout))
}

fn protected_routes(state: AppState) -> Router<AppState> {
    Resource::ALL
        .iter()
        .fold(Router::new(), |router, r| router.merge(resource_routes(*r)))
        .merge(user_routes())
        .merge(report_routes())
        .route_layer(from_fn_with_state(state, jwt_auth_middleware))
}

fn user_routes() -> Router<AppState> {
    use protected::users;

    Router::new()
        .route("/users/me/", get(users::me_get).patch(users::me_patch))
        .route("/users/dpo/", get(users::dpo_get))
        .route("/users/", get(users::list).post(users::create))
        .route(
            "/users/:id/",
            get(users::retrieve)
                .put(users::update)
                .patch(users::update)
                .delete(users::deactivate),
        )
        .route("/users/:id/reactivate/", post(users::reactivate))
}

fn resource_routes(resource: Resource) -> Router<AppState> {
    use protected::records;

    Router::new()
        .route(
            &format!("/{}/", resource.path()),
            get(records::list).post(records::create),
        )
        .route(
            &format!("/{}/:id/", resource.path()),
            get(records::retrieve)
                .put(records::replace)
                .patch(records::patch)
                .delete(records::destroy),
        )
        .layer(Extension(resource))
}

fn report_routes() -> Router<AppState> {
    use protected::{activity, dashboard, plans};

    Router::new()
        .route("/planos-acao/stats/overdue/", get(plans::overdue_stats))
        .route("/planos-acao/ensure-overdue/", post(plans::ensure_overdue))
        .route("/dashboard/", get(dashboard::dashboard_get))
        .route("/login-activity/", get(activity::login_activity))
        .route("/activity-log/", get(activity::activity_log))
}

fn cors_layer(security: &SecurityConfig) -> CorsLayer {
    if security.cors_origins.is_empty() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = security
        .cors_origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", o);
                None
            }
        })
        .collect();

    // Credentials are needed for the refresh cookie
    CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

/// Creates the admin account on first start when credentials are supplied
pub async fn seed_admin(store: &dyn Store, email: &str, password: &str) -> anyhow::Result<()> {
    let email = email.trim().to_lowercase();
    if store.find_user_by_email(&email).await?.is_some() {
        return Ok(());
    }

    let mut admin = NewUser::new(&email, hash_password(password)?, Role::Admin);
    admin.is_superuser = true;
    admin.first_name = "Admin".into();
    store.create_user(admin).await?;
    info!("Seeded admin user {}", email);
    Ok(())
}

/// Open the store, bind and serve until ctrl-c
pub async fn serve(config: AppConfig) -> anyhow::Result<()> {
    if config.security.jwt_secret.is_empty() {
        anyhow::bail!("JWT_SECRET must be set outside development");
    }

    let store = DatabaseManager::open(&config.database).await?;

    if let (Ok(email), Ok(password)) = (
        std::env::var("CAMALEAO_ADMIN_EMAIL"),
        std::env::var("CAMALEAO_ADMIN_PASSWORD"),
    ) {
        seed_admin(store.as_ref(), &email, &password).await?;
    }

    let bind_addr = format!("{}:{}", config.server.bind_host, config.server.port);
    let state = AppState::new(store, config);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!("Camaleão API listening on http://{}", bind_addr);

    axum::serve(listener, app(state).into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestContext;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn call(router: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn json_post(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn root_lists_every_resource() {
        let ctx = TestContext::new();
        let (status, body) = call(app(ctx.state.clone()), Request::get("/").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        let resources = body["endpoints"]["resources"].as_array().unwrap();
        assert_eq!(resources.len(), Resource::ALL.len());
    }

    #[tokio::test]
    async fn protected_routes_reject_anonymous_calls() {
        let ctx = TestContext::new();
        for uri in ["/riscos/", "/users/me/", "/dashboard/", "/activity-log/"] {
            let (status, body) = call(app(ctx.state.clone()), Request::get(uri).body(Body::empty()).unwrap()).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{}", uri);
            assert_eq!(body["code"], "UNAUTHORIZED");
        }
    }

    #[tokio::test]
    async fn token_pair_opens_protected_routes() {
        let ctx = TestContext::new();
        ctx.create_user("dpo@example.com", "Str0ng!pass", Role::Dpo).await.unwrap();

        let (status, pair) = call(
            app(ctx.state.clone()),
            json_post("/auth/token/", json!({ "email": "dpo@example.com", "password": "Str0ng!pass" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let request = Request::get("/users/me/")
            .header(header::AUTHORIZATION, format!("Bearer {}", pair["access"].as_str().unwrap()))
            .body(Body::empty())
            .unwrap();
        let (status, me) = call(app(ctx.state.clone()), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["email"], "dpo@example.com");
        assert_eq!(me["role"], "dpo");
    }

    #[tokio::test]
    async fn seeding_the_admin_is_idempotent() {
        let ctx = TestContext::new();
        seed_admin(ctx.store.as_ref(), "Admin@Example.com", "Str0ng!pass").await.unwrap();
        seed_admin(ctx.store.as_ref(), "admin@example.com", "Other!pass1").await.unwrap();

        let users = ctx.store.list_users().await.unwrap();
        assert_eq!(users.len(), 1);
        assert!(users[0].is_admin());
        assert!(crate::auth::verify_password("Str0ng!pass", &users[0].password_hash));
    }
}
