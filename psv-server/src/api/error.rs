//! Conversion of core errors into HTTP responses
//!
//! Every failed request reports a message plus the participant's unchanged
//! state, so the page can re-prompt the same item.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use psv_common::Error;
use serde_json::json;

use super::survey::ViewResponse;

/// API error with an optional state snapshot
#[derive(Debug)]
pub struct ApiError {
    pub error: Error,
    pub view: Option<ViewResponse>,
}

impl ApiError {
    pub fn new(error: Error) -> Self {
        Self { error, view: None }
    }

    pub fn with_view(mut self, view: Option<ViewResponse>) -> Self {
        self.view = view;
        self
    }

    pub fn status(&self) -> StatusCode {
        match self.error {
            Error::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::InvalidAction(_) => StatusCode::CONFLICT,
            Error::Persistence(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::OutOfRange { .. } | Error::Catalog(_) | Error::Config(_) | Error::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        Self::new(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self.error);
        }

        let body = Json(json!({
            "error": self.error.to_string(),
            "kind": self.error.kind(),
            "view": self.view,
        }));

        (status, body).into_response()
    }
}
