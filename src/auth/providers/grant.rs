//! Token endpoint request and response handling shared by both providers.

use chrono::{Duration, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::debug;

use crate::auth::error::AuthError;
use crate::auth::token::{ProviderId, TokenRecord};
use crate::config::ClientCredentials;

/// Normalized token endpoint payload.
#[derive(Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default, deserialize_with = "deserialize_expires_in")]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl TokenResponse {
    /// Build the record to persist.
    ///
    /// A response without a refresh token keeps `previous_refresh_token`.
    /// A missing or zero `expires_in` uses the provider's nominal lifetime.
    /// A lifetime whose expiry cannot be represented is an invalid response.
    pub fn into_record(
        self,
        provider: ProviderId,
        previous_refresh_token: Option<String>,
    ) -> Result<TokenRecord, AuthError> {
        let access_token = self
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                AuthError::InvalidResponse(format!(
                    "{provider} token response has no access_token"
                ))
            })?;
        let lifetime = match self.expires_in {
            None | Some(0) => provider.default_lifetime(),
            Some(secs) if secs > 0 => Duration::try_seconds(secs).ok_or_else(|| {
                AuthError::InvalidResponse(format!(
                    "{provider} token response has out-of-range expires_in ({secs})"
                ))
            })?,
            Some(secs) => {
                return Err(AuthError::InvalidResponse(format!(
                    "{provider} token response has negative expires_in ({secs})"
                )))
            }
        };
        let refresh_token = self
            .refresh_token
            .filter(|token| !token.is_empty())
            .or(previous_refresh_token);
        let expires_at = Utc::now().checked_add_signed(lifetime).ok_or_else(|| {
            AuthError::InvalidResponse(format!(
                "{provider} token response has out-of-range expires_in"
            ))
        })?;
        Ok(TokenRecord {
            access_token,
            refresh_token,
            expires_at,
        })
    }
}

#[derive(Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// Parse a token endpoint body.
///
/// Accepts a JSON object, or a JSON string whose content is itself a JSON
/// object (the shape some eBay client libraries hand back).
pub fn parse_token_response(provider: ProviderId, body: &str) -> Result<TokenResponse, AuthError> {
    let value = unwrap_json_string(body).map_err(|err| {
        AuthError::InvalidResponse(format!("{provider} token response is not JSON: {err}"))
    })?;
    if !value.is_object() {
        return Err(AuthError::InvalidResponse(format!(
            "{provider} token response is not a JSON object"
        )));
    }
    serde_json::from_value(value).map_err(|err| {
        AuthError::InvalidResponse(format!("{provider} token response is malformed: {err}"))
    })
}

fn unwrap_json_string(body: &str) -> Result<Value, serde_json::Error> {
    let value: Value = serde_json::from_str(body)?;
    match value {
        Value::String(inner) => serde_json::from_str(&inner),
        other => Ok(other),
    }
}

fn protocol_error(provider: ProviderId, status: u16, body: &str) -> AuthError {
    let parsed = unwrap_json_string(body)
        .ok()
        .and_then(|value| serde_json::from_value::<ErrorResponse>(value).ok());
    let (error, description) = parsed
        .map(|e| (e.error, e.error_description))
        .unwrap_or((None, None));
    AuthError::Protocol {
        provider,
        status,
        error,
        description,
    }
}

/// POST a form to a token endpoint with HTTP Basic client authentication.
///
/// No retries. Non-2xx responses become [`AuthError::Protocol`] carrying the
/// provider's `error` and `error_description` when the body has them.
pub async fn request_token(
    client: &reqwest::Client,
    provider: ProviderId,
    token_url: &str,
    credentials: &ClientCredentials,
    form: &[(&str, &str)],
) -> Result<TokenResponse, AuthError> {
    let response = client
        .post(token_url)
        .basic_auth(&credentials.client_id, Some(&credentials.client_secret))
        .header("Accept", "application/json")
        .form(form)
        .send()
        .await?;

    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        debug!(provider = %provider, status = status.as_u16(), "token endpoint rejected request");
        return Err(protocol_error(provider, status.as_u16(), &body));
    }
    parse_token_response(provider, &body)
}

fn deserialize_expires_in<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom("expires_in out of range")),
        Some(Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|e| serde::de::Error::custom(format!("invalid expires_in string: {e}"))),
        Some(other) => Err(serde::de::Error::custom(format!(
            "invalid expires_in: {other}"
        ))),
    }
}
