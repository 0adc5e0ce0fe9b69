use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::api::ApiError;
use crate::config::ConfigError;

/// Failures that end a request with a non-200 status.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("unknown automation {0:?}")]
    UnknownAutomation(String),

    #[error("failed to fetch item {item_id}: {source}")]
    Fetch {
        item_id: u64,
        #[source]
        source: ApiError,
    },

    #[error("failed to update item {item_id}: {source}")]
    Write {
        item_id: u64,
        #[source]
        source: ApiError,
    },

    #[error("{0} is not configured")]
    Unavailable(&'static str),
}

impl DispatchError {
    pub fn status(&self) -> StatusCode {
        match self {
            DispatchError::UnknownAutomation(_) => StatusCode::NOT_FOUND,
            DispatchError::Config(_)
            | DispatchError::Fetch { .. }
            | DispatchError::Write { .. }
            | DispatchError::Unavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses() {
        assert_eq!(
            DispatchError::Config(ConfigError::MissingToken).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            DispatchError::UnknownAutomation("x".into()).status(),
            StatusCode::NOT_FOUND
        );
        let fetch = DispatchError::Fetch {
            item_id: 4,
            source: ApiError::permanent("boom"),
        };
        assert_eq!(fetch.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(fetch.to_string(), "failed to fetch item 4: API error: boom");
    }
}
