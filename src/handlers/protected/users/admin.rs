// handlers/protected/users/admin.rs - User directory management
//
// Non-admins may only retrieve their own account; everything else here
// requires the admin role. Deletion is a soft deactivation.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::{user_json, UserPayload, AUDIT_MODULE};
use crate::auth::hash_password;
use crate::database::models::{ActivityResult, NewUser, Role, User};
use crate::error::ApiError;
use crate::middleware::permissions::require_admin;
use crate::middleware::{ApiResponse, ApiResult, AuthUser, RequestMeta};
use crate::resources::ValidationErrors;
use crate::server::AppState;
use crate::types::Operation;

#[derive(Debug, Default, Deserialize)]
pub struct UserListQuery {
    /// `1`/`true` lists deactivated accounts instead of active ones
    #[serde(default)]
    pub show_inactive: Option<String>,
    #[serde(default)]
    pub q: Option<String>,
}

impl UserListQuery {
    fn inactive_only(&self) -> bool {
        matches!(self.show_inactive.as_deref(), Some("1" | "true" | "True"))
    }

    fn matches(&self, user: &User) -> bool {
        if user.is_active == self.inactive_only() {
            return false;
        }
        match self.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            None => true,
            Some(q) => {
                let q = q.to_lowercase();
                [&user.email, &user.first_name, &user.last_name]
                    .iter()
                    .any(|f| f.to_lowercase().contains(&q))
            }
        }
    }
}

pub async fn list(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<UserListQuery>,
) -> ApiResult<Vec<Value>> {
    require_admin(&auth)?;

    let mut users: Vec<User> = state
        .store
        .list_users()
        .await?
        .into_iter()
        .filter(|u| query.matches(u))
        .collect();
    users.sort_by(|a, b| a.email.cmp(&b.email));

    Ok(ApiResponse::success(users.iter().map(|u| user_json(u, &[])).collect()))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    meta: RequestMeta,
    Json(payload): Json<UserPayload>,
) -> ApiResult<Value> {
    require_admin(&auth)?;

    let mut errors = ValidationErrors::new();
    let email = payload.email.as_deref().map(str::trim).unwrap_or_default();
    if email.is_empty() {
        errors.add("email", "This field is required.");
    }
    if payload.password.as_deref().map_or(true, str::is_empty) {
        errors.add("password", "This field is required.");
    }
    let password = payload.new_password(&mut errors);
    let role = payload.parsed_role(&mut errors).unwrap_or(Role::Gerente);

    // Validate the profile fields against a scratch user before insert
    let mut draft = NewUser::new(email, "", role).into_user(0, chrono::Utc::now());
    payload.apply_profile(&mut draft, &mut errors);

    let password = match (password, errors.is_empty()) {
        (Some(p), true) => p,
        _ => return Err(errors.into()),
    };

    let mut new_user = NewUser::new(draft.email, hash_password(&password)?, role);
    new_user.first_name = draft.first_name;
    new_user.last_name = draft.last_name;
    new_user.phone_number = draft.phone_number;
    new_user.job_title = draft.job_title;
    new_user.appointment_date = draft.appointment_date;
    new_user.appointment_validity = draft.appointment_validity;

    let user = state.store.create_user(new_user).await.map_err(|e| match e {
        crate::database::DatabaseError::Duplicate(_) => {
            ApiError::field_error("email", "user with this email already exists.")
        }
        other => other.into(),
    })?;

    info!("User {} created by {}", user.email, auth.user.email);
    state
        .audit
        .record(
            Some(&auth.user),
            AUDIT_MODULE,
            Operation::Create,
            Some(user.id.to_string()),
            ActivityResult::Success,
            format!("Created user {}", user.email),
            meta.ip,
        )
        .await;

    Ok(ApiResponse::created(user_json(&user, &[])))
}

/// Admins see anyone; other users only themselves (404 otherwise)
pub async fn retrieve(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> ApiResult<Value> {
    if !auth.is_admin() && auth.id() != id {
        return Err(ApiError::not_found("Not found."));
    }
    let user = state.store.get_user(id).await?;
    Ok(ApiResponse::success(user_json(&user, &[])))
}

/// PUT and PATCH both apply only the supplied fields
pub async fn update(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
    meta: RequestMeta,
    Json(payload): Json<UserPayload>,
) -> ApiResult<Value> {
    require_admin(&auth)?;

    let mut user = state.store.get_user(id).await?;
    let mut errors = ValidationErrors::new();

    payload.apply_profile(&mut user, &mut errors);
    if let Some(role) = payload.parsed_role(&mut errors) {
        user.role = role;
    }
    let password = payload.new_password(&mut errors);
    if !errors.is_empty() {
        return Err(errors.into());
    }
    if let Some(password) = password {
        user.password_hash = hash_password(&password)?;
    }

    let user = state.store.update_user(&user).await.map_err(|e| match e {
        crate::database::DatabaseError::Duplicate(_) => {
            ApiError::field_error("email", "user with this email already exists.")
        }
        other => other.into(),
    })?;

    state
        .audit
        .record(
            Some(&auth.user),
            AUDIT_MODULE,
            Operation::Update,
            Some(user.id.to_string()),
            ActivityResult::Success,
            format!("Updated user {}", user.email),
            meta.ip,
        )
        .await;

    Ok(ApiResponse::success(user_json(&user, &[])))
}

/// DELETE: soft deactivation; admins cannot deactivate themselves
pub async fn deactivate(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
    meta: RequestMeta,
) -> ApiResult<Value> {
    require_admin(&auth)?;

    if auth.id() == id {
        state
            .audit
            .record(
                Some(&auth.user),
                AUDIT_MODULE,
                Operation::Deactivate,
                Some(id.to_string()),
                ActivityResult::Invalid,
                "Attempted to deactivate own account",
                meta.ip,
            )
            .await;
        return Err(ApiError::bad_request("You cannot deactivate your own account."));
    }

    let mut user = state.store.get_user(id).await?;
    user.is_active = false;
    let user = state.store.update_user(&user).await?;

    info!("User {} deactivated by {}", user.email, auth.user.email);
    state
        .audit
        .record(
            Some(&auth.user),
            AUDIT_MODULE,
            Operation::Deactivate,
            Some(user.id.to_string()),
            ActivityResult::Success,
            format!("Deactivated user {}", user.email),
            meta.ip,
        )
        .await;

    Ok(ApiResponse::success(json!({
        "detail": format!("User {} deactivated.", user.email)
    })))
}

pub async fn reactivate(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
    meta: RequestMeta,
) -> ApiResult<Value> {
    require_admin(&auth)?;

    let mut user = state.store.get_user(id).await?;
    user.is_active = true;
    let user = state.store.update_user(&user).await?;

    state
        .audit
        .record(
            Some(&auth.user),
            AUDIT_MODULE,
            Operation::Reactivate,
            Some(user.id.to_string()),
            ActivityResult::Success,
            format!("Reactivated user {}", user.email),
            meta.ip,
        )
        .await;

    Ok(ApiResponse::success(json!({
        "detail": format!("User {} reactivated.", user.email)
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_query_splits_active_and_inactive() {
        let mut active = crate::testing::user(1, "ana@example.com", Role::Gerente);
        active.first_name = "Ana".into();
        let mut gone = crate::testing::user(2, "bruno@example.com", Role::Dpo);
        gone.is_active = false;

        let default = UserListQuery::default();
        assert!(default.matches(&active));
        assert!(!default.matches(&gone));

        let inactive = UserListQuery {
            show_inactive: Some("1".into()),
            q: None,
        };
        assert!(!inactive.matches(&active));
        assert!(inactive.matches(&gone));
    }

    #[test]
    fn list_query_searches_names_case_insensitively() {
        let mut user = crate::testing::user(1, "x@example.com", Role::Gerente);
        user.last_name = "Souza".into();
        let q = UserListQuery {
            show_inactive: None,
            q: Some("SOU".into()),
        };
        assert!(q.matches(&user));
        let miss = UserListQuery {
            show_inactive: None,
            q: Some("lima".into()),
        };
        assert!(!miss.matches(&user));
    }
}
