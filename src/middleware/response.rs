// middleware/response.rs - Success responses for the JSON API
//
// The body is the payload itself (record, list or page); failures go through
// `ApiError` and carry the `{"error": true, ...}` envelope instead.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;

use crate::error::ApiError;

#[derive(Debug)]
pub struct ApiResponse<T: Serialize> {
    status: StatusCode,
    body: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(body: T) -> Self {
        Self {
            status: StatusCode::OK,
            body: Some(body),
        }
    }

    pub fn created(body: T) -> Self {
        Self {
            status: StatusCode::CREATED,
            body: Some(body),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl ApiResponse<()> {
    /// 204 with an empty body, for deletes
    pub fn no_content() -> Self {
        Self {
            status: StatusCode::NO_CONTENT,
            body: None,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let Some(body) = self.body else {
            return self.status.into_response();
        };

        match serde_json::to_value(&body) {
            Ok(value) => (self.status, Json(value)).into_response(),
            Err(e) => {
                tracing::error!("Failed to serialize response body: {}", e);
                ApiError::internal_server_error("Failed to serialize response").into_response()
            }
        }
    }
}

pub type ApiResult<T> = Result<ApiResponse<T>, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn statuses_match_the_constructor() {
        assert_eq!(ApiResponse::success(json!({})).status(), StatusCode::OK);
        assert_eq!(ApiResponse::created(json!({ "id": 1 })).status(), StatusCode::CREATED);
        assert_eq!(ApiResponse::no_content().status(), StatusCode::NO_CONTENT);
    }

    #[test]
    fn no_content_has_an_empty_body() {
        let response = ApiResponse::no_content().into_response();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }
}
