// handlers/public/mod.rs - Public handlers (no authentication required)

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

use crate::resources::Resource;
use crate::server::AppState;

pub mod auth;

pub async fn root() -> Json<Value> {
    let resources: Vec<String> = Resource::ALL.iter().map(|r| format!("/{}/", r.path())).collect();

    Json(json!({
        "name": "Camaleão API",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "LGPD compliance management backend",
        "endpoints": {
            "auth": "/auth/token/, /auth/token/refresh/, /auth/token/verify/, /auth/login/, /auth/refresh/, /auth/logout/ (public)",
            "users": "/users/me/, /users/dpo/, /users/[:id/] (protected)",
            "resources": resources,
            "reports": "/dashboard/, /planos-acao/stats/overdue/, /login-activity/, /activity-log/ (protected)",
            "health": "/health (public)",
        }
    }))
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();

    match state.store.health_check().await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "timestamp": now,
                "database": state.store.backend(),
            })),
        ),
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "degraded",
                    "timestamp": now,
                    "database": state.store.backend(),
                    "error": "database unavailable",
                })),
            )
        }
    }
}
