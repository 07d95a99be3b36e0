use thiserror::Error;

use super::token::ProviderId;

/// Normalized authentication errors across both providers.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Required client credentials or redirect URI are not configured.
    #[error("Missing configuration: {}", .missing.join(", "))]
    Configuration { missing: Vec<String> },
    /// Callback state did not match, or the handshake slot was missing,
    /// expired or tampered with.
    #[error("Invalid state or missing verifier: {0}")]
    HandshakeValidation(String),
    /// The provider redirected back with `error` instead of a code.
    #[error("Authorization denied: {error}")]
    AuthorizationDenied {
        error: String,
        description: Option<String>,
    },
    /// The callback carried neither a code nor an error.
    #[error("Callback carried no authorization code")]
    MissingCode,
    /// Token endpoint answered with a non-2xx status.
    #[error("{provider} token endpoint returned {status}{}", describe(.error, .description))]
    Protocol {
        provider: ProviderId,
        status: u16,
        error: Option<String>,
        description: Option<String>,
    },
    /// Token endpoint answered 2xx but the payload was not a usable token set.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    /// No stored record, or no refresh token to renew it with.
    #[error("{0} not connected")]
    NotConnected(ProviderId),
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AuthError {
    /// Short human-readable message safe to put in a redirect URL.
    ///
    /// Prefers the provider's `error_description`, then its `error` code.
    pub fn user_message(&self) -> String {
        match self {
            Self::Protocol {
                description: Some(description),
                ..
            }
            | Self::AuthorizationDenied {
                description: Some(description),
                ..
            } => description.clone(),
            Self::Protocol {
                error: Some(error), ..
            }
            | Self::AuthorizationDenied { error, .. } => error.clone(),
            Self::MissingCode => "no_code".to_string(),
            Self::HandshakeValidation(_) => "invalid_state_or_missing_verifier".to_string(),
            other => other.to_string(),
        }
    }

    /// Whether the caller should drive a fresh authorization handshake.
    pub fn requires_reauthorization(&self) -> bool {
        matches!(self, Self::NotConnected(_))
            || matches!(
                self,
                Self::Protocol { error: Some(code), .. } if code == "invalid_grant"
            )
    }
}

fn describe(error: &Option<String>, description: &Option<String>) -> String {
    match (error, description) {
        (Some(error), Some(description)) => format!(": {error} ({description})"),
        (Some(error), None) => format!(": {error}"),
        (None, Some(description)) => format!(": {description}"),
        (None, None) => String::new(),
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(error: reqwest::Error) -> Self {
        // reqwest includes the request URL, never the form body.
        Self::Network(error.without_url().to_string())
    }
}

impl From<url::ParseError> for AuthError {
    fn from(error: url::ParseError) -> Self {
        Self::InvalidUrl(error.to_string())
    }
}

impl From<std::io::Error> for AuthError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}
