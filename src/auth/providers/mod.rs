//! Per-provider OAuth token clients.

pub mod airtable;
pub mod ebay;
pub mod grant;

use std::sync::Arc;

use async_trait::async_trait;

use super::error::AuthError;
use super::pkce::HandshakeState;
use super::token::{ProviderId, TokenRecord};
use crate::config::ConnectorConfig;

pub use airtable::AirtableOAuth;
pub use ebay::EbayOAuth;

/// An authorization redirect ready to send to the browser.
#[derive(Debug)]
pub struct AuthorizationRequest {
    pub url: String,
    /// State the callback must be checked against. `None` when the provider
    /// does not use a client-side handshake slot.
    pub handshake: Option<HandshakeState>,
}

/// Authorization code returned on the callback, plus the PKCE pair when the
/// provider needs it for server-side re-validation.
#[derive(Clone, Copy)]
pub struct CodeGrant<'a> {
    pub code: &'a str,
    pub state: Option<&'a str>,
    pub code_verifier: Option<&'a str>,
}

impl<'a> CodeGrant<'a> {
    pub fn new(code: &'a str) -> Self {
        Self {
            code,
            state: None,
            code_verifier: None,
        }
    }

    pub fn with_pkce(mut self, state: &'a str, code_verifier: &'a str) -> Self {
        self.state = Some(state);
        self.code_verifier = Some(code_verifier);
        self
    }
}

/// Protocol client for one provider's authorization and token endpoints.
///
/// Every call takes the configuration snapshot to use, so credentials are
/// never cached inside the client.
#[async_trait]
pub trait TokenClient: Send + Sync {
    fn provider(&self) -> ProviderId;

    fn authorization_request(
        &self,
        config: &ConnectorConfig,
    ) -> Result<AuthorizationRequest, AuthError>;

    async fn exchange(
        &self,
        config: &ConnectorConfig,
        grant: CodeGrant<'_>,
    ) -> Result<TokenRecord, AuthError>;

    /// Returns a record whose refresh token is the rotated one, or
    /// `refresh_token` itself when the provider did not rotate it.
    async fn refresh(
        &self,
        config: &ConnectorConfig,
        refresh_token: &str,
    ) -> Result<TokenRecord, AuthError>;
}

/// The default client for each provider, sharing one HTTP client.
pub fn default_clients(http: reqwest::Client) -> Vec<Arc<dyn TokenClient>> {
    vec![
        Arc::new(AirtableOAuth::new(http.clone())),
        Arc::new(EbayOAuth::new(http)),
    ]
}
