use async_trait::async_trait;
use tracing::{debug, instrument};
use url::Url;

use super::grant::request_token;
use super::{AuthorizationRequest, CodeGrant, TokenClient};
use crate::auth::error::AuthError;
use crate::auth::pkce::{HandshakeState, CHALLENGE_METHOD};
use crate::auth::token::{ProviderId, TokenRecord};
use crate::config::ConnectorConfig;

pub const AIRTABLE_AUTHORIZE_URL: &str = "https://airtable.com/oauth2/v1/authorize";
pub const AIRTABLE_TOKEN_URL: &str = "https://airtable.com/oauth2/v1/token";
pub const AIRTABLE_SCOPES: &[&str] = &[
    "data.records:read",
    "data.records:write",
    "schema.bases:read",
];

/// Airtable authorization code flow with PKCE.
///
/// # Example
/// ```no_run
/// use listing_connector::auth::providers::AirtableOAuth;
///
/// let oauth = AirtableOAuth::new(reqwest::Client::new())
///     .with_token_url("http://127.0.0.1:9999/oauth2/v1/token");
/// ```
#[derive(Debug, Clone)]
pub struct AirtableOAuth {
    client: reqwest::Client,
    authorize_url: String,
    token_url: String,
}

impl AirtableOAuth {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            authorize_url: AIRTABLE_AUTHORIZE_URL.to_string(),
            token_url: AIRTABLE_TOKEN_URL.to_string(),
        }
    }

    pub fn with_authorize_url(mut self, url: impl Into<String>) -> Self {
        self.authorize_url = url.into();
        self
    }

    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    /// Authorization URL for an already-issued state and challenge.
    pub fn authorization_url(
        &self,
        client_id: &str,
        redirect_uri: &str,
        state: &str,
        code_challenge: &str,
    ) -> Result<String, AuthError> {
        let scope = AIRTABLE_SCOPES.join(" ");
        let url = Url::parse_with_params(
            &self.authorize_url,
            &[
                ("client_id", client_id),
                ("redirect_uri", redirect_uri),
                ("response_type", "code"),
                ("scope", scope.as_str()),
                ("state", state),
                ("code_challenge", code_challenge),
                ("code_challenge_method", CHALLENGE_METHOD),
            ],
        )?;
        Ok(url.into())
    }
}

#[async_trait]
impl TokenClient for AirtableOAuth {
    fn provider(&self) -> ProviderId {
        ProviderId::Airtable
    }

    fn authorization_request(
        &self,
        config: &ConnectorConfig,
    ) -> Result<AuthorizationRequest, AuthError> {
        let credentials = config.credentials(ProviderId::Airtable)?;
        let handshake = HandshakeState::issue();
        let challenge = handshake.code_challenge().ok_or_else(|| {
            AuthError::HandshakeValidation("no code verifier issued".to_string())
        })?;
        let url = self.authorization_url(
            &credentials.client_id,
            &credentials.redirect_uri,
            &handshake.state,
            &challenge,
        )?;
        Ok(AuthorizationRequest {
            url,
            handshake: Some(handshake),
        })
    }

    #[instrument(name = "airtable.exchange", skip_all)]
    async fn exchange(
        &self,
        config: &ConnectorConfig,
        grant: CodeGrant<'_>,
    ) -> Result<TokenRecord, AuthError> {
        let credentials = config.credentials(ProviderId::Airtable)?;
        let (Some(state), Some(code_verifier)) = (grant.state, grant.code_verifier) else {
            return Err(AuthError::HandshakeValidation(
                "Airtable code exchange requires state and code verifier".to_string(),
            ));
        };
        let response = request_token(
            &self.client,
            ProviderId::Airtable,
            &self.token_url,
            &credentials,
            &[
                ("grant_type", "authorization_code"),
                ("code", grant.code),
                ("redirect_uri", credentials.redirect_uri.as_str()),
                ("state", state),
                ("code_verifier", code_verifier),
            ],
        )
        .await?;
        let record = response.into_record(ProviderId::Airtable, None)?;
        debug!(expires_at = %record.expires_at, "airtable code exchanged");
        Ok(record)
    }

    #[instrument(name = "airtable.refresh", skip_all)]
    async fn refresh(
        &self,
        config: &ConnectorConfig,
        refresh_token: &str,
    ) -> Result<TokenRecord, AuthError> {
        let credentials = config.credentials(ProviderId::Airtable)?;
        let response = request_token(
            &self.client,
            ProviderId::Airtable,
            &self.token_url,
            &credentials,
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ],
        )
        .await?;
        let record = response.into_record(ProviderId::Airtable, Some(refresh_token.to_string()))?;
        debug!(expires_at = %record.expires_at, "airtable token refreshed");
        Ok(record)
    }
}
