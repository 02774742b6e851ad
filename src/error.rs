// HTTP API errors
//
// Every failure leaves the server as `{"error": true, "message", "code"}`,
// plus `field_errors` for validation failures, with the matching status.

use std::collections::HashMap;

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};
use thiserror::Error;

use crate::auth::JwtError;
use crate::database::DatabaseError;
use crate::resources::ValidationErrors;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{message}")]
    ValidationError {
        message: String,
        field_errors: Option<HashMap<String, String>>,
    },

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    InternalServerError(String),

    #[error("{0}")]
    ServiceUnavailable(String),
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::ValidationError { .. } => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            ApiError::InternalServerError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_SERVER_ERROR"),
            ApiError::ServiceUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE"),
        }
    }

    pub fn status_code(&self) -> u16 {
        self.status_and_code().0.as_u16()
    }

    pub fn error_code(&self) -> &'static str {
        self.status_and_code().1
    }

    /// Client-safe message; internals are logged, never returned
    pub fn message(&self) -> &str {
        match self {
            ApiError::ValidationError { message, .. } => message,
            ApiError::BadRequest(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::Forbidden(msg)
            | ApiError::NotFound(msg)
            | ApiError::Conflict(msg)
            | ApiError::InternalServerError(msg)
            | ApiError::ServiceUnavailable(msg) => msg,
        }
    }

    pub fn to_json(&self) -> Value {
        let mut body = json!({
            "error": true,
            "message": self.message(),
            "code": self.error_code(),
        });
        if let ApiError::ValidationError { field_errors: Some(fields), .. } = self {
            body["field_errors"] = json!(fields);
        }
        body
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn validation_error(message: impl Into<String>, field_errors: Option<HashMap<String, String>>) -> Self {
        ApiError::ValidationError {
            message: message.into(),
            field_errors,
        }
    }

    /// Single-field validation failure
    pub fn field_error(field: impl Into<String>, message: impl Into<String>) -> Self {
        let fields = HashMap::from([(field.into(), message.into())]);
        ApiError::validation_error("Invalid field values", Some(fields))
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError::Conflict(message.into())
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        ApiError::ServiceUnavailable(message.into())
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound(msg) => ApiError::not_found(msg),
            DatabaseError::Duplicate(msg) => ApiError::conflict(msg),
            DatabaseError::ConfigMissing(_) | DatabaseError::InvalidDatabaseUrl => {
                tracing::error!("Database misconfiguration: {}", err);
                ApiError::service_unavailable("Database temporarily unavailable")
            }
            DatabaseError::QueryError(msg) => {
                tracing::error!("Database query error: {}", msg);
                ApiError::internal_server_error("An error occurred while processing your request")
            }
            DatabaseError::Sqlx(sqlx_err) => {
                tracing::error!("SQLx error: {}", sqlx_err);
                ApiError::internal_server_error("Database error occurred")
            }
        }
    }
}

impl From<JwtError> for ApiError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::InvalidSecret | JwtError::TokenGeneration(_) | JwtError::PasswordHash(_) => {
                tracing::error!("Token service error: {}", err);
                ApiError::internal_server_error("Authentication service unavailable")
            }
            JwtError::Invalid(_) | JwtError::WrongTokenType { .. } | JwtError::Blacklisted => {
                ApiError::unauthorized(err.to_string())
            }
        }
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        ApiError::validation_error("Invalid field values", Some(errors.into_map()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, _) = self.status_and_code();
        (status, Json(self.to_json())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_carries_field_errors() {
        let err = ApiError::field_error("email", "This field is required");
        assert_eq!(err.status_code(), 400);
        let body = err.to_json();
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert_eq!(body["field_errors"]["email"], "This field is required");
    }

    #[test]
    fn plain_errors_have_no_field_errors() {
        let body = ApiError::forbidden("nope").to_json();
        assert_eq!(body["code"], "FORBIDDEN");
        assert!(body.get("field_errors").is_none());
    }

    #[test]
    fn store_errors_do_not_leak_internals() {
        let err: ApiError = DatabaseError::QueryError("relation \"users\" does not exist".into()).into();
        assert_eq!(err.status_code(), 500);
        assert!(!err.message().contains("relation"));

        let err: ApiError = DatabaseError::NotFound("User 7".into()).into();
        assert_eq!(err.status_code(), 404);
    }

    #[test]
    fn token_errors_are_unauthorized() {
        let err: ApiError = JwtError::Blacklisted.into();
        assert_eq!(err.status_code(), 401);
        assert_eq!(err.error_code(), "UNAUTHORIZED");
    }
}
