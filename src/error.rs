use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::request::ValidationError;

/// Everything that can end a chat request without a successful reply
#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    InvalidRequest(#[from] ValidationError),

    /// Request body larger than the proxy will read
    #[error("Request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    /// No usable provider credential
    #[error("Server misconfiguration: {0}")]
    Unconfigured(String),

    /// Every candidate failed, or one failed in a way no other model can fix.
    /// `status` is set only when an upstream status should reach the client;
    /// otherwise the response is a 502.
    #[error("Upstream failure: {detail}")]
    Upstream {
        status: Option<StatusCode>,
        detail: String,
        tried: Vec<String>,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ChatError {
    pub fn status(&self) -> StatusCode {
        match self {
            ChatError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ChatError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ChatError::Unconfigured(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ChatError::Upstream { status, .. } => status
                .filter(|s| s.is_client_error() || s.is_server_error())
                .unwrap_or(StatusCode::BAD_GATEWAY),
            ChatError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tried: Option<&'a [String]>,
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ChatError::InvalidRequest(_) | ChatError::PayloadTooLarge { .. } => ErrorBody {
                error: self.to_string(),
                detail: None,
                tried: None,
            },
            ChatError::Unconfigured(detail) => ErrorBody {
                error: "Server misconfiguration".to_string(),
                detail: Some(detail),
                tried: None,
            },
            ChatError::Upstream { detail, tried, .. } => ErrorBody {
                error: "AI provider request failed".to_string(),
                detail: Some(detail),
                tried: Some(tried),
            },
            ChatError::Internal(detail) => ErrorBody {
                error: "Internal server error".to_string(),
                detail: Some(detail),
                tried: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};

    async fn body_json(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_invalid_request_response() {
        let response = ChatError::from(ValidationError::InvalidPrompt).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            json!({
                "error": "Prompt is required, must not be blank and must be at most 2000 characters"
            })
        );
    }

    #[tokio::test]
    async fn test_payload_too_large_response() {
        let response = ChatError::PayloadTooLarge { limit: 65536 }.into_response();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(
            body_json(response).await,
            json!({ "error": "Request body exceeds 65536 bytes" })
        );
    }

    #[tokio::test]
    async fn test_unconfigured_response() {
        let response = ChatError::Unconfigured("No AI provider API key is set.".to_string())
            .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await,
            json!({ "error": "Server misconfiguration", "detail": "No AI provider API key is set." })
        );
    }

    #[tokio::test]
    async fn test_upstream_response_lists_tried_models() {
        let response = ChatError::Upstream {
            status: None,
            detail: "connection refused".to_string(),
            tried: vec!["a".to_string(), "b".to_string()],
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            body_json(response).await,
            json!({
                "error": "AI provider request failed",
                "detail": "connection refused",
                "tried": ["a", "b"]
            })
        );
    }

    #[test]
    fn test_upstream_status_passthrough() {
        let err = ChatError::Upstream {
            status: Some(StatusCode::UNAUTHORIZED),
            detail: String::new(),
            tried: vec![],
        };
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);

        let err = ChatError::Upstream {
            status: Some(StatusCode::OK),
            detail: String::new(),
            tried: vec![],
        };
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    }
}
