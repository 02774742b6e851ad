// handlers/protected/activity.rs - Admin views of the audit trail

use axum::{
    extract::{Query, State},
    Extension, Json,
};
use serde::Deserialize;

use crate::database::models::{ActivityLogEntry, LoginActivity};
use crate::error::ApiError;
use crate::middleware::permissions::require_admin;
use crate::middleware::AuthUser;
use crate::server::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ActivityQuery {
    #[serde(default)]
    pub user: Option<i64>,
    #[serde(default)]
    pub module: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl ActivityQuery {
    fn limit(&self, max: usize) -> usize {
        self.limit.filter(|l| *l > 0).map_or(max, |l| l.min(max))
    }
}

/// GET /login-activity/ - newest first
pub async fn login_activity(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<ActivityQuery>,
) -> Result<Json<Vec<LoginActivity>>, ApiError> {
    require_admin(&auth)?;

    let entries = state
        .store
        .list_logins()
        .await?
        .into_iter()
        .filter(|l| query.user.map_or(true, |u| l.user_id == u))
        .take(query.limit(state.config.api.max_page_size))
        .collect();
    Ok(Json(entries))
}

/// GET /activity-log/ - newest first, optionally narrowed by user or module
pub async fn activity_log(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<ActivityQuery>,
) -> Result<Json<Vec<ActivityLogEntry>>, ApiError> {
    require_admin(&auth)?;

    let entries = state
        .store
        .list_activity()
        .await?
        .into_iter()
        .filter(|e| query.user.map_or(true, |u| e.user_id == Some(u)))
        .filter(|e| query.module.as_deref().map_or(true, |m| e.module == m))
        .take(query.limit(state.config.api.max_page_size))
        .collect();
    Ok(Json(entries))
}
