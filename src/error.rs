use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::upstream::UpstreamError;

/// Request-scoped failures.  Each variant maps onto one HTTP status and a
/// plain-text body.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("Invalid request body")]
    MalformedInput,
    #[error("Missing required fields: {}", .0.join(" and "))]
    MissingField(Vec<&'static str>),
    #[error("Method not allowed")]
    MethodNotAllowed,
    #[error("Request too large")]
    PayloadTooLarge,
    #[error("Dialogflow API error: {0}")]
    UpstreamFailure(#[from] UpstreamError),
    #[error("Failed to encode response")]
    EncodingFailure(#[source] serde_json::Error),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::MalformedInput | ProxyError::MissingField(_) => StatusCode::BAD_REQUEST,
            ProxyError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ProxyError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ProxyError::UpstreamFailure(_) | ProxyError::EncodingFailure(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}
