//! Error types for the viewgate server.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use viewgate_core::EnforcementDecision;

/// Errors returned to the client by the enforcement middleware.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The principal lacks the handler's permission.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
}

impl ServerError {
    /// Build the denial for a decision that did not allow the request.
    pub fn denied(decision: &EnforcementDecision) -> Self {
        Self::PermissionDenied(format!("access to '{}' requires a permission", decision.handler))
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ServerError::PermissionDenied(e) => (StatusCode::FORBIDDEN, e),
        };

        let body = Json(serde_json::json!({
            "error": message,
            "code": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
