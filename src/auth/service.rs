use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info, instrument};

use super::cookie::HandshakeSealer;
use super::error::AuthError;
use super::manager::TokenManager;
use super::pkce::HandshakeState;
use super::providers::CodeGrant;
use super::token::{ProviderId, TokenRecord};

/// Redirect to the provider's authorization endpoint.
#[derive(Debug, Clone)]
pub struct AuthorizationRedirect {
    pub provider: ProviderId,
    pub url: String,
    /// Sealed handshake slot to store client-side, for providers that use one.
    pub handshake_cookie: Option<String>,
}

/// Query parameters a provider sends back to the callback URL.
#[derive(Clone, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Drives the authorization handshake for both providers and hands the
/// resulting tokens to the [`TokenManager`].
///
/// Transport concerns (cookies, redirects) belong to the caller; this only
/// produces and consumes sealed handshake slots.
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use listing_connector::auth::{AuthService, HandshakeSealer, ProviderId, TokenManager};
///
/// # fn demo(manager: Arc<TokenManager>) -> Result<(), listing_connector::auth::AuthError> {
/// let service = AuthService::new(manager, HandshakeSealer::ephemeral());
/// let redirect = service.begin(ProviderId::Airtable)?;
/// println!("open {}", redirect.url);
/// # Ok(())
/// # }
/// ```
pub struct AuthService {
    manager: Arc<TokenManager>,
    sealer: HandshakeSealer,
    /// States of slots already presented to a callback, kept until the slot
    /// would have expired anyway.
    consumed: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl AuthService {
    pub fn new(manager: Arc<TokenManager>, sealer: HandshakeSealer) -> Self {
        Self {
            manager,
            sealer,
            consumed: Mutex::new(HashMap::new()),
        }
    }

    pub fn manager(&self) -> &Arc<TokenManager> {
        &self.manager
    }

    pub fn sealer(&self) -> &HandshakeSealer {
        &self.sealer
    }

    /// Start an authorization: issue fresh handshake state and build the
    /// provider URL. Fails with a configuration error before anything is
    /// issued when credentials are missing.
    pub fn begin(&self, provider: ProviderId) -> Result<AuthorizationRedirect, AuthError> {
        let config = self.manager.config();
        let client = self.manager.client(provider)?;
        let request = client.authorization_request(&config)?;
        let handshake_cookie = request
            .handshake
            .as_ref()
            .map(|handshake| self.sealer.seal(handshake))
            .transpose()?;
        debug!(provider = %provider, "authorization redirect issued");
        Ok(AuthorizationRedirect {
            provider,
            url: request.url,
            handshake_cookie,
        })
    }

    /// Finish an authorization from the callback parameters and the sealed
    /// handshake slot, if any. The slot is consumed whatever the outcome.
    ///
    /// For PKCE providers a missing, expired, tampered or mismatched slot
    /// fails before the token endpoint is contacted.
    #[instrument(skip_all, fields(provider = %provider))]
    pub async fn complete(
        &self,
        provider: ProviderId,
        params: &CallbackParams,
        handshake_cookie: Option<&str>,
    ) -> Result<TokenRecord, AuthError> {
        if let Some(error) = params.error.as_deref().filter(|e| !e.is_empty()) {
            return Err(AuthError::AuthorizationDenied {
                error: error.to_string(),
                description: params.error_description.clone(),
            });
        }
        let code = params
            .code
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or(AuthError::MissingCode)?;

        let config = self.manager.config();
        config.credentials(provider)?;
        let client = self.manager.client(provider)?;

        let record = if provider.uses_pkce() {
            let sealed = handshake_cookie
                .filter(|c| !c.is_empty())
                .ok_or_else(|| AuthError::HandshakeValidation("no handshake in progress".to_string()))?;
            let handshake = self.sealer.open(sealed)?;
            self.consume(&handshake)?;
            let handshake = handshake.validate(params.state.as_deref())?;
            let grant = CodeGrant::new(code).with_pkce(&handshake.state, &handshake.code_verifier);
            client.exchange(&config, grant).await?
        } else {
            client.exchange(&config, CodeGrant::new(code)).await?
        };

        self.manager.record_exchange(provider, &record).await?;
        info!("authorization completed");
        Ok(record)
    }

    /// Mark a slot as used, whether or not its state goes on to match.
    fn consume(&self, handshake: &HandshakeState) -> Result<(), AuthError> {
        let mut consumed = self
            .consumed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let cutoff = Utc::now() - self.sealer.ttl();
        consumed.retain(|_, issued_at| *issued_at > cutoff);
        if consumed
            .insert(handshake.state.clone(), handshake.issued_at)
            .is_some()
        {
            return Err(AuthError::HandshakeValidation(
                "handshake already used".to_string(),
            ));
        }
        Ok(())
    }
}
