// handlers/protected/plans.rs - Overdue action plan reporting and marking

use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chrono::Local;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::database::models::ActivityResult;
use crate::error::ApiError;
use crate::middleware::permissions::require_admin_or_dpo;
use crate::middleware::{AuthUser, RequestMeta};
use crate::resources::Resource;
use crate::server::AppState;
use crate::services::overdue::{overdue_report, OverdueReport};
use crate::services::OverdueRun;
use crate::types::Operation;

/// GET /planos-acao/stats/overdue/
pub async fn overdue_stats(State(state): State<AppState>) -> Result<Json<OverdueReport>, ApiError> {
    let today = Local::now().date_naive();
    Ok(Json(overdue_report(state.store.as_ref(), today).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct EnsureOverdueQuery {
    #[serde(default)]
    pub force: Option<String>,
}

/// POST /planos-acao/ensure-overdue/ - once per day unless `force=1`
pub async fn ensure_overdue(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    meta: RequestMeta,
    Query(query): Query<EnsureOverdueQuery>,
) -> Result<Json<Value>, ApiError> {
    require_admin_or_dpo(&auth)?;

    let force = matches!(query.force.as_deref(), Some("1" | "true"));
    let today = Local::now().date_naive();
    let run = state
        .overdue
        .run_if_needed(state.store.as_ref(), today, force)
        .await?;

    let (updated, detail) = match run {
        OverdueRun::Updated(n) => (n, format!("{} plano(s) marcado(s) como atrasado.", n)),
        OverdueRun::AlreadyRan => (0, "Already updated today.".to_string()),
        OverdueRun::Busy => (0, "An update is already running.".to_string()),
    };

    if let OverdueRun::Updated(n) = run {
        state
            .audit
            .record(
                Some(&auth.user),
                Resource::PlanosAcao.audit_module(),
                Operation::Update,
                None,
                ActivityResult::Success,
                format!("Marked {} overdue plan(s)", n),
                meta.ip,
            )
            .await;
    }

    Ok(Json(json!({ "updated": updated, "detail": detail })))
}
