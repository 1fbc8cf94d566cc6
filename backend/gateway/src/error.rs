//! `AgentError` → HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use agora_core::AgentError;

/// Wrapper giving runtime errors an HTTP shape.
pub struct ApiError(pub AgentError);

impl From<AgentError> for ApiError {
    fn from(err: AgentError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            AgentError::NotFound(_) => StatusCode::NOT_FOUND,
            AgentError::Configuration { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AgentError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            AgentError::Launch { .. }
            | AgentError::Model { .. }
            | AgentError::Session { .. }
            | AgentError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = json!({
            "error": self.0.to_string(),
            "agent_id": self.0.agent_id(),
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError(AgentError::NotFound("x".into())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError(AgentError::configuration("x", "bad")).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ApiError(AgentError::Timeout {
                agent_id: "x".into(),
                elapsed_ms: 10
            })
            .status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            ApiError(AgentError::model("x", "boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
