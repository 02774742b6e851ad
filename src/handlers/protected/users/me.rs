// handlers/protected/users/me.rs - GET/PATCH /users/me/, GET /users/dpo/

use axum::{extract::State, Extension, Json};
use serde_json::Value;
use tracing::info;

use super::{user_json, UserPayload, AUDIT_MODULE};
use crate::auth::{hash_password, verify_password};
use crate::database::models::{ActivityResult, Role};
use crate::error::ApiError;
use crate::handlers::public::auth::utils::revoke_refresh;
use crate::middleware::{AuthUser, RequestMeta};
use crate::resources::ValidationErrors;
use crate::server::AppState;
use crate::types::Operation;

pub async fn me_get(Extension(auth): Extension<AuthUser>) -> Json<Value> {
    Json(user_json(&auth.user, &[]))
}

/// Profile update; a password change needs the current password and forces re-login
pub async fn me_patch(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    meta: RequestMeta,
    Json(payload): Json<UserPayload>,
) -> Result<Json<Value>, ApiError> {
    let mut user = auth.user.clone();
    let mut errors = ValidationErrors::new();

    payload.apply_profile(&mut user, &mut errors);
    if payload.role.is_some() {
        errors.add("role", "You cannot change your own role.");
    }

    let new_password = payload.new_password(&mut errors);
    if new_password.is_some() {
        let current = payload.current_password.as_deref().unwrap_or_default();
        if current.is_empty() {
            errors.add("current_password", "This field is required to change the password.");
        } else if !verify_password(current, &auth.user.password_hash) {
            errors.add("current_password", "Current password is incorrect.");
        }
    }

    if !errors.is_empty() {
        return Err(errors.into());
    }

    let password_changed = match new_password {
        Some(password) => {
            user.password_hash = hash_password(&password)?;
            true
        }
        None => false,
    };

    let user = state.store.update_user(&user).await?;

    if password_changed {
        if let Some(raw) = payload.refresh.as_deref().filter(|r| !r.is_empty()) {
            revoke_refresh(&state, raw).await;
        }
        info!("User {} changed their password", user.email);
    }

    state
        .audit
        .record(
            Some(&user),
            AUDIT_MODULE,
            Operation::Update,
            Some(user.id.to_string()),
            ActivityResult::Success,
            if password_changed { "Profile and password updated" } else { "Profile updated" },
            meta.ip,
        )
        .await;

    Ok(Json(user_json(&user, &[("reauth_required", Value::Bool(password_changed))])))
}

/// The registered data protection officer (lowest id with role dpo)
pub async fn dpo_get(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let users = state.store.list_users().await?;
    users
        .iter()
        .find(|u| u.role == Role::Dpo)
        .map(|u| Json(user_json(u, &[])))
        .ok_or_else(|| ApiError::not_found("DPO not found."))
}
