use async_trait::async_trait;
use tracing::{debug, instrument};
use url::Url;

use super::grant::request_token;
use super::{AuthorizationRequest, CodeGrant, TokenClient};
use crate::auth::error::AuthError;
use crate::auth::pkce::new_state;
use crate::auth::token::{ProviderId, TokenRecord};
use crate::config::{ConnectorConfig, EbayEnvironment};

pub const EBAY_SCOPES: &[&str] = &[
    "https://api.ebay.com/oauth/api_scope",
    "https://api.ebay.com/oauth/api_scope/sell.inventory",
    "https://api.ebay.com/oauth/api_scope/commerce.media.upload",
];

/// eBay confidential-client authorization code flow.
///
/// Endpoints follow `EBAY_ENVIRONMENT` at call time unless overridden.
/// The redirect URI is eBay's RuName, sent verbatim.
#[derive(Debug, Clone)]
pub struct EbayOAuth {
    client: reqwest::Client,
    authorize_url: Option<String>,
    token_url: Option<String>,
}

impl EbayOAuth {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            authorize_url: None,
            token_url: None,
        }
    }

    /// Pin the authorize endpoint regardless of environment.
    pub fn with_authorize_url(mut self, url: impl Into<String>) -> Self {
        self.authorize_url = Some(url.into());
        self
    }

    /// Pin the token endpoint regardless of environment.
    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = Some(url.into());
        self
    }

    fn authorize_endpoint(&self, environment: EbayEnvironment) -> &str {
        self.authorize_url
            .as_deref()
            .unwrap_or_else(|| environment.authorize_url())
    }

    fn token_endpoint(&self, environment: EbayEnvironment) -> &str {
        self.token_url
            .as_deref()
            .unwrap_or_else(|| environment.token_url())
    }

    pub fn authorization_url(
        &self,
        environment: EbayEnvironment,
        client_id: &str,
        redirect_uri: &str,
        state: &str,
    ) -> Result<String, AuthError> {
        let scope = EBAY_SCOPES.join(" ");
        let url = Url::parse_with_params(
            self.authorize_endpoint(environment),
            &[
                ("client_id", client_id),
                ("redirect_uri", redirect_uri),
                ("response_type", "code"),
                ("scope", scope.as_str()),
                ("state", state),
            ],
        )?;
        Ok(url.into())
    }
}

#[async_trait]
impl TokenClient for EbayOAuth {
    fn provider(&self) -> ProviderId {
        ProviderId::Ebay
    }

    fn authorization_request(
        &self,
        config: &ConnectorConfig,
    ) -> Result<AuthorizationRequest, AuthError> {
        let credentials = config.credentials(ProviderId::Ebay)?;
        let url = self.authorization_url(
            config.ebay_environment,
            &credentials.client_id,
            &credentials.redirect_uri,
            &new_state(),
        )?;
        Ok(AuthorizationRequest {
            url,
            handshake: None,
        })
    }

    #[instrument(name = "ebay.exchange", skip_all, fields(environment = config.ebay_environment.as_str()))]
    async fn exchange(
        &self,
        config: &ConnectorConfig,
        grant: CodeGrant<'_>,
    ) -> Result<TokenRecord, AuthError> {
        let credentials = config.credentials(ProviderId::Ebay)?;
        let response = request_token(
            &self.client,
            ProviderId::Ebay,
            self.token_endpoint(config.ebay_environment),
            &credentials,
            &[
                ("grant_type", "authorization_code"),
                ("code", grant.code),
                ("redirect_uri", credentials.redirect_uri.as_str()),
            ],
        )
        .await?;
        let record = response.into_record(ProviderId::Ebay, None)?;
        debug!(expires_at = %record.expires_at, "ebay code exchanged");
        Ok(record)
    }

    #[instrument(name = "ebay.refresh", skip_all, fields(environment = config.ebay_environment.as_str()))]
    async fn refresh(
        &self,
        config: &ConnectorConfig,
        refresh_token: &str,
    ) -> Result<TokenRecord, AuthError> {
        let credentials = config.credentials(ProviderId::Ebay)?;
        let scope = EBAY_SCOPES.join(" ");
        let response = request_token(
            &self.client,
            ProviderId::Ebay,
            self.token_endpoint(config.ebay_environment),
            &credentials,
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("scope", scope.as_str()),
            ],
        )
        .await?;
        let record = response.into_record(ProviderId::Ebay, Some(refresh_token.to_string()))?;
        debug!(expires_at = %record.expires_at, "ebay token refreshed");
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderSettings;
    use std::collections::HashMap;

    fn config(environment: EbayEnvironment) -> ConnectorConfig {
        ConnectorConfig {
            ebay: ProviderSettings::new("eb-client", "eb-secret", "Seller-RuName-1"),
            ebay_environment: environment,
            ..ConnectorConfig::default()
        }
    }

    fn query(url: &str) -> HashMap<String, String> {
        Url::parse(url)
            .unwrap()
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[test]
    fn sandbox_authorization_request() {
        let oauth = EbayOAuth::new(reqwest::Client::new());
        let request = oauth
            .authorization_request(&config(EbayEnvironment::Sandbox))
            .unwrap();
        assert!(request.handshake.is_none());
        assert!(request
            .url
            .starts_with("https://auth.sandbox.ebay.com/oauth2/authorize?"));

        let params = query(&request.url);
        assert_eq!(params["client_id"], "eb-client");
        assert_eq!(params["redirect_uri"], "Seller-RuName-1");
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["scope"], EBAY_SCOPES.join(" "));
        assert!(!params["state"].is_empty());
        assert!(!params.contains_key("code_challenge"));
    }

    #[test]
    fn production_environment_switches_endpoints() {
        let oauth = EbayOAuth::new(reqwest::Client::new());
        let request = oauth
            .authorization_request(&config(EbayEnvironment::Production))
            .unwrap();
        assert!(request.url.starts_with("https://auth.ebay.com/oauth2/authorize?"));
        assert_eq!(
            oauth.token_endpoint(EbayEnvironment::Production),
            "https://api.ebay.com/identity/v1/oauth2/token"
        );
    }

    #[test]
    fn override_pins_endpoints() {
        let oauth = EbayOAuth::new(reqwest::Client::new())
            .with_token_url("http://127.0.0.1:9/token");
        assert_eq!(
            oauth.token_endpoint(EbayEnvironment::Production),
            "http://127.0.0.1:9/token"
        );
    }

    #[test]
    fn missing_credentials_are_named() {
        let oauth = EbayOAuth::new(reqwest::Client::new());
        let mut cfg = config(EbayEnvironment::Sandbox);
        cfg.ebay.client_secret = None;
        let err = oauth.authorization_request(&cfg).unwrap_err();
        assert_eq!(err.to_string(), "Missing configuration: EBAY_CLIENT_SECRET");
    }
}
