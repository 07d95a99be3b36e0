//! Error types for the connector's HTTP surface and data client.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use crate::auth::AuthError;

/// Primary error type outside the token lifecycle core.
#[derive(Error, Debug)]
pub enum ConnectorError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<reqwest::Error> for ConnectorError {
    fn from(error: reqwest::Error) -> Self {
        // Request URLs can carry record filters; keep them out of messages.
        Self::Network(error.without_url().to_string())
    }
}

impl ConnectorError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// HTTP status and stable machine-readable code for this error.
    pub fn classify(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Auth(auth) => match auth {
                AuthError::NotConnected(_) => (StatusCode::UNAUTHORIZED, "not_connected"),
                AuthError::Configuration { .. } => {
                    (StatusCode::SERVICE_UNAVAILABLE, "configuration_error")
                }
                AuthError::UnknownProvider(_) => (StatusCode::NOT_FOUND, "unknown_provider"),
                AuthError::HandshakeValidation(_)
                | AuthError::MissingCode
                | AuthError::AuthorizationDenied { .. } => {
                    (StatusCode::BAD_REQUEST, "handshake_failed")
                }
                AuthError::Protocol { .. } | AuthError::InvalidResponse(_) => {
                    (StatusCode::BAD_GATEWAY, "provider_error")
                }
                AuthError::Network(_) => (StatusCode::BAD_GATEWAY, "network_error"),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
            },
            Self::Api { status, .. } => match status {
                401 | 403 => (StatusCode::UNAUTHORIZED, "upstream_unauthorized"),
                404 => (StatusCode::NOT_FOUND, "not_found"),
                _ => (StatusCode::BAD_GATEWAY, "upstream_error"),
            },
            Self::Network(_) => (StatusCode::BAD_GATEWAY, "network_error"),
            Self::InvalidArgument(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            Self::Io(_) | Self::Serialization(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        }
    }
}

impl IntoResponse for ConnectorError {
    fn into_response(self) -> Response {
        let (status, code) = self.classify();
        if status.is_server_error() {
            tracing::error!(code, error = %self, "request failed");
        }
        let body = json!({
            "error": {
                "code": code,
                "message": self.to_string(),
            }
        });
        (status, axum::Json(body)).into_response()
    }
}
