use std::collections::HashMap;

use serde_json::Value;
use thiserror::Error;

/// Terminal outcome of a token refresh, shared by every waiting request
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshError {
    #[error("No refresh token stored")]
    MissingRefreshToken,

    #[error("Refresh rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Refresh response did not contain an access token")]
    InvalidResponse,

    #[error("Refresh request failed: {0}")]
    Transport(String),

    #[error("Refresh was abandoned before it completed")]
    Abandoned,

    #[error("Token storage failed: {0}")]
    Storage(String),
}

#[derive(Debug, Error)]
pub enum ClientError {
    /// 4xx with per-field messages
    #[error("Validation failed: {message}")]
    Validation {
        status: u16,
        message: String,
        field_errors: HashMap<String, String>,
    },

    /// 401/403 that a refresh could not (or should not) fix
    #[error("Not authorized ({status}): {message}")]
    Auth { status: u16, message: String },

    /// The session is over; the user has to log in again
    #[error("{message}")]
    ReauthRequired {
        message: String,
        #[source]
        cause: Option<RefreshError>,
    },

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String, body: Value },

    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("Token storage failed: {0}")]
    Storage(String),
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Validation { status, .. }
            | ClientError::Auth { status, .. }
            | ClientError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_reauth_required(&self) -> bool {
        matches!(self, ClientError::ReauthRequired { .. })
    }

    /// Map a non-success response body onto the matching variant
    pub(crate) fn from_response(status: u16, body: Value) -> Self {
        let message = body
            .get("message")
            .or_else(|| body.get("detail"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("HTTP {}", status));

        let field_errors: HashMap<String, String> = body
            .get("field_errors")
            .and_then(Value::as_object)
            .map(|m| {
                m.iter()
                    .map(|(k, v)| (k.clone(), v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        match status {
            401 | 403 => ClientError::Auth { status, message },
            400..=499 if !field_errors.is_empty() => ClientError::Validation {
                status,
                message,
                field_errors,
            },
            _ => ClientError::Api { status, message, body },
        }
    }
}
