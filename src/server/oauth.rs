use std::str::FromStr;

use axum::extract::{Path, Query, State};
use axum::http::header::{COOKIE, LOCATION, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{info, warn};

use super::SharedState;
use crate::auth::{cookie_name, AuthError, CallbackParams, ConnectionStatus, ProviderId};
use crate::error::ConnectorError;

/// GET /oauth/status: stored-token presence per provider.
pub(super) async fn status(State(state): State<SharedState>) -> Json<ConnectionStatus> {
    Json(state.manager().status())
}

/// GET /oauth/{provider}: redirect to the provider's consent page.
pub(super) async fn authorize(
    State(state): State<SharedState>,
    Path(provider): Path<String>,
) -> Result<Response, ConnectorError> {
    let provider = parse_provider(&provider)?;
    let config = state.manager().config();

    match state.auth.begin(provider) {
        Ok(redirect) => {
            let cookie = redirect
                .handshake_cookie
                .as_deref()
                .map(|sealed| {
                    handshake_cookie_header(
                        provider,
                        sealed,
                        state.auth.sealer().ttl().num_seconds(),
                        config.cookie_secure,
                    )
                })
                .transpose()?;
            found(&redirect.url, cookie)
        }
        Err(err @ AuthError::Configuration { .. }) => {
            warn!(provider = %provider, error = %err, "authorization not started");
            let location = status_redirect_url(
                &config.status_redirect_url,
                &format!("{provider}_error"),
                &err.user_message(),
            );
            found(&location, None)
        }
        Err(err) => Err(err.into()),
    }
}

/// GET /oauth/{provider}/callback: finish the handshake and redirect to the
/// status page. The handshake cookie is cleared on every outcome.
pub(super) async fn callback(
    State(state): State<SharedState>,
    Path(provider): Path<String>,
    Query(params): Query<CallbackParams>,
    headers: HeaderMap,
) -> Result<Response, ConnectorError> {
    let provider = parse_provider(&provider)?;
    let config = state.manager().config();
    let sealed = read_cookie(&headers, &cookie_name(provider));

    let location = match state
        .auth
        .complete(provider, &params, sealed.as_deref())
        .await
    {
        Ok(_) => {
            info!(provider = %provider, "provider connected");
            status_redirect_url(&config.status_redirect_url, provider.as_ref(), "ok")
        }
        Err(err) => {
            warn!(provider = %provider, error = %err, "authorization callback failed");
            status_redirect_url(
                &config.status_redirect_url,
                &format!("{provider}_error"),
                &err.user_message(),
            )
        }
    };

    found(
        &location,
        Some(clear_cookie_header(provider, config.cookie_secure)?),
    )
}

/// DELETE /oauth/{provider}: forget stored tokens for one provider.
pub(super) async fn disconnect(
    State(state): State<SharedState>,
    Path(provider): Path<String>,
) -> Result<Json<ConnectionStatus>, ConnectorError> {
    let provider = parse_provider(&provider)?;
    state.manager().disconnect(provider).await?;
    Ok(Json(state.manager().status()))
}

fn parse_provider(raw: &str) -> Result<ProviderId, ConnectorError> {
    ProviderId::from_str(raw).map_err(|_| AuthError::UnknownProvider(raw.to_string()).into())
}

fn found(location: &str, cookie: Option<HeaderValue>) -> Result<Response, ConnectorError> {
    let location = HeaderValue::from_str(location).map_err(|_| {
        ConnectorError::InvalidArgument("redirect location is not a valid header".to_string())
    })?;
    let mut response = (StatusCode::FOUND, [(LOCATION, location)]).into_response();
    if let Some(cookie) = cookie {
        response.headers_mut().append(SET_COOKIE, cookie);
    }
    Ok(response)
}

/// Append `key=value` to the status page URL, keeping any existing query.
pub fn status_redirect_url(base: &str, key: &str, value: &str) -> String {
    let separator = if base.contains('?') { '&' } else { '?' };
    let value: String = url::form_urlencoded::byte_serialize(value.as_bytes()).collect();
    format!("{base}{separator}{key}={value}")
}

/// `Set-Cookie` value storing a sealed handshake slot.
pub fn handshake_cookie_header(
    provider: ProviderId,
    sealed: &str,
    max_age_secs: i64,
    secure: bool,
) -> Result<HeaderValue, ConnectorError> {
    cookie_header(&cookie_name(provider), sealed, max_age_secs, secure)
}

/// `Set-Cookie` value expiring the handshake slot immediately.
pub fn clear_cookie_header(provider: ProviderId, secure: bool) -> Result<HeaderValue, ConnectorError> {
    cookie_header(&cookie_name(provider), "", 0, secure)
}

fn cookie_header(
    name: &str,
    value: &str,
    max_age_secs: i64,
    secure: bool,
) -> Result<HeaderValue, ConnectorError> {
    let mut cookie = format!("{name}={value}; Path=/; Max-Age={max_age_secs}; HttpOnly; SameSite=Lax");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
        .map_err(|_| ConnectorError::InvalidArgument(format!("cookie {name} has an invalid value")))
}

/// Value of the named cookie from the request's `Cookie` headers.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"').to_string())
        .filter(|value| !value.is_empty())
}
