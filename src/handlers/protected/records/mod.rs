// handlers/protected/records/mod.rs - CRUD for every compliance resource
//
// One set of handlers serves all collections; the router attaches the
// `Resource` as an extension. Calendar events are scoped to their owner,
// every other resource is readable by any user and writable by admin/dpo.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{Datelike, Utc};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::database::models::{ActivityResult, Record};
use crate::database::DatabaseError;
use crate::error::ApiError;
use crate::middleware::permissions::{can_see, can_write};
use crate::middleware::{ApiResponse, ApiResult, AuthUser, RequestMeta};
use crate::resources::{incident_number, validate::references, validate_payload, Resource, ValidationErrors, WriteMode};
use crate::server::AppState;
use crate::types::Operation;

pub mod query;

pub use query::ListQuery;

pub async fn list(
    State(state): State<AppState>,
    Extension(resource): Extension<Resource>,
    Extension(auth): Extension<AuthUser>,
    meta: RequestMeta,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, ApiError> {
    let page = query.page_number()?;

    let mut records: Vec<Record> = state
        .store
        .list_records(resource)
        .await?
        .into_iter()
        .filter(|r| can_see(&auth, r))
        .filter(|r| query::matches_search(resource, r, query.search.as_deref()))
        .collect();

    let ordering = query
        .ordering
        .as_deref()
        .filter(|o| !o.trim().is_empty())
        .unwrap_or(resource.default_ordering());
    query::sort_records(&mut records, ordering);

    if query.is_first_page() {
        state
            .audit
            .record(
                Some(&auth.user),
                resource.audit_module(),
                Operation::Access,
                None,
                ActivityResult::Success,
                format!("Listed {} ({} records)", resource, records.len()),
                meta.ip,
            )
            .await;
    }

    let items: Vec<Value> = records.iter().map(Record::to_json).collect();
    let body = match page {
        None => Value::Array(items),
        Some(page) => {
            let page_size = query.page_size(&state.config.api);
            serde_json::to_value(query::paginate(resource, &query, items, page, page_size)?)
                .map_err(|e| ApiError::internal_server_error(e.to_string()))?
        }
    };
    Ok(Json(body))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(resource): Extension<Resource>,
    Extension(auth): Extension<AuthUser>,
    meta: RequestMeta,
    Json(body): Json<Value>,
) -> ApiResult<Value> {
    can_write(&auth, resource)?;

    let data = match validate(&state, resource, &body, None, WriteMode::Create).await {
        Ok(data) => data,
        Err(errors) => return Err(reject(&state, resource, &auth, &meta, Operation::Create, None, errors).await),
    };

    let mut record = state.store.insert_record(resource, Some(auth.id()), data).await?;

    if resource == Resource::Incidentes {
        let year = record
            .date_field("data_registro")
            .map(|d| d.year())
            .unwrap_or_else(|| Utc::now().year());
        let mut data = record.data.clone();
        data.insert("numero_registro".into(), Value::String(incident_number(year, record.id)));
        record = state.store.update_record(resource, record.id, data).await?;
    }

    debug!("Created {} {} for user {}", resource, record.id, auth.id());
    state
        .audit
        .record(
            Some(&auth.user),
            resource.audit_module(),
            Operation::Create,
            Some(record.id.to_string()),
            ActivityResult::Success,
            format!("Created {} {}", resource, record.id),
            meta.ip,
        )
        .await;

    Ok(ApiResponse::created(record.to_json()))
}

pub async fn retrieve(
    State(state): State<AppState>,
    Extension(resource): Extension<Resource>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
    meta: RequestMeta,
) -> ApiResult<Value> {
    let record = load_visible(&state, resource, &auth, id).await?;

    state
        .audit
        .record(
            Some(&auth.user),
            resource.audit_module(),
            Operation::Access,
            Some(id.to_string()),
            ActivityResult::Success,
            format!("Viewed {} {}", resource, id),
            meta.ip,
        )
        .await;

    Ok(ApiResponse::success(record.to_json()))
}

pub async fn replace(
    state: State<AppState>,
    resource: Extension<Resource>,
    auth: Extension<AuthUser>,
    Path(id): Path<i64>,
    meta: RequestMeta,
    Json(body): Json<Value>,
) -> ApiResult<Value> {
    write(state, resource, auth, id, meta, body, WriteMode::Replace).await
}

pub async fn patch(
    state: State<AppState>,
    resource: Extension<Resource>,
    auth: Extension<AuthUser>,
    Path(id): Path<i64>,
    meta: RequestMeta,
    Json(body): Json<Value>,
) -> ApiResult<Value> {
    write(state, resource, auth, id, meta, body, WriteMode::Patch).await
}

pub async fn destroy(
    State(state): State<AppState>,
    Extension(resource): Extension<Resource>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
    meta: RequestMeta,
) -> ApiResult<()> {
    let record = load_visible(&state, resource, &auth, id).await?;
    can_write(&auth, resource)?;

    state.store.delete_record(resource, record.id).await?;

    state
        .audit
        .record(
            Some(&auth.user),
            resource.audit_module(),
            Operation::Delete,
            Some(id.to_string()),
            ActivityResult::Success,
            format!("Deleted {} {}", resource, id),
            meta.ip,
        )
        .await;

    Ok(ApiResponse::<()>::no_content())
}

async fn write(
    State(state): State<AppState>,
    Extension(resource): Extension<Resource>,
    Extension(auth): Extension<AuthUser>,
    id: i64,
    meta: RequestMeta,
    body: Value,
    mode: WriteMode,
) -> ApiResult<Value> {
    let existing = load_visible(&state, resource, &auth, id).await?;
    can_write(&auth, resource)?;

    let data = match validate(&state, resource, &body, Some(&existing.data), mode).await {
        Ok(data) => data,
        Err(errors) => {
            return Err(reject(&state, resource, &auth, &meta, Operation::Update, Some(id), errors).await)
        }
    };

    let record = state.store.update_record(resource, id, data).await?;

    state
        .audit
        .record(
            Some(&auth.user),
            resource.audit_module(),
            Operation::Update,
            Some(id.to_string()),
            ActivityResult::Success,
            format!("Updated {} {}", resource, id),
            meta.ip,
        )
        .await;

    Ok(ApiResponse::success(record.to_json()))
}

/// Missing and foreign owner-scoped records both answer 404
async fn load_visible(state: &AppState, resource: Resource, auth: &AuthUser, id: i64) -> Result<Record, ApiError> {
    match state.store.get_record(resource, id).await {
        Ok(record) if can_see(auth, &record) => Ok(record),
        Ok(_) | Err(DatabaseError::NotFound(_)) => Err(ApiError::not_found("Not found.")),
        Err(e) => Err(e.into()),
    }
}

/// Schema validation plus existence checks for referenced records
async fn validate(
    state: &AppState,
    resource: Resource,
    body: &Value,
    existing: Option<&Map<String, Value>>,
    mode: WriteMode,
) -> Result<Map<String, Value>, ValidationErrors> {
    let data = validate_payload(resource, body, existing, mode)?;

    let mut errors = ValidationErrors::new();
    for (field, target, ref_id) in references(resource, &data) {
        match state.store.get_record(target, ref_id).await {
            Ok(_) => {}
            Err(DatabaseError::NotFound(_)) => {
                errors.add(field, format!("Invalid pk \"{}\" - object does not exist.", ref_id));
            }
            Err(e) => {
                tracing::error!("Reference check for {} failed: {}", field, e);
                errors.add(field, "Could not verify the referenced object.");
            }
        }
    }

    if errors.is_empty() {
        Ok(data)
    } else {
        Err(errors)
    }
}

/// Log the rejected write and turn the field errors into a 400
async fn reject(
    state: &AppState,
    resource: Resource,
    auth: &AuthUser,
    meta: &RequestMeta,
    operation: Operation,
    id: Option<i64>,
    errors: ValidationErrors,
) -> ApiError {
    state
        .audit
        .record(
            Some(&auth.user),
            resource.audit_module(),
            operation,
            id.map(|i| i.to_string()),
            ActivityResult::Invalid,
            errors.to_string(),
            meta.ip.clone(),
        )
        .await;
    errors.into()
}
