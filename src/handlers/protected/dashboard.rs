// handlers/protected/dashboard.rs - GET /dashboard/

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::Local;
use serde::Deserialize;

use crate::error::ApiError;
use crate::server::AppState;
use crate::services::dashboard::DEFAULT_RANKING_LIMIT;
use crate::services::{Dashboard, DashboardInput};

#[derive(Debug, Default, Deserialize)]
pub struct DashboardQuery {
    /// Number of users in the access ranking
    #[serde(default)]
    pub limit: Option<String>,
}

pub async fn dashboard_get(
    State(state): State<AppState>,
    Query(query): Query<DashboardQuery>,
) -> Result<Json<Dashboard>, ApiError> {
    let limit = query
        .limit
        .as_deref()
        .and_then(|l| l.trim().parse::<usize>().ok())
        .filter(|l| *l > 0)
        .unwrap_or(DEFAULT_RANKING_LIMIT);

    let input = DashboardInput::load(state.store.as_ref()).await?;
    Ok(Json(Dashboard::build(&input, Local::now().date_naive(), limit)))
}
