#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use listing_connector::auth::providers::{AirtableOAuth, EbayOAuth, TokenClient};
use listing_connector::auth::{AuthError, ProviderId, TokenManager, TokenRecord, TokenStore};
use listing_connector::config::{ConnectorConfig, ProviderSettings, StaticConfigSource};

pub const AIRTABLE_BASIC: &str = "Basic YXQtY2xpZW50OmF0LXNlY3JldA==";
pub const EBAY_BASIC: &str = "Basic ZWItY2xpZW50OmViLXNlY3JldA==";

#[derive(Default)]
pub struct InMemoryTokenStore {
    tokens: Mutex<HashMap<ProviderId, TokenRecord>>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, provider: ProviderId, record: TokenRecord) {
        self.tokens
            .lock()
            .expect("store lock poisoned")
            .insert(provider, record);
    }

    pub fn get(&self, provider: ProviderId) -> Option<TokenRecord> {
        self.tokens
            .lock()
            .expect("store lock poisoned")
            .get(&provider)
            .cloned()
    }
}

impl TokenStore for InMemoryTokenStore {
    fn load(&self, provider: ProviderId) -> Result<Option<TokenRecord>, AuthError> {
        Ok(self.get(provider))
    }

    fn save(&self, provider: ProviderId, record: &TokenRecord) -> Result<(), AuthError> {
        self.seed(provider, record.clone());
        Ok(())
    }

    fn clear(&self, provider: ProviderId) -> Result<(), AuthError> {
        self.tokens
            .lock()
            .expect("store lock poisoned")
            .remove(&provider);
        Ok(())
    }
}

pub fn fresh(access_token: &str, refresh_token: Option<&str>) -> TokenRecord {
    TokenRecord {
        access_token: access_token.to_string(),
        refresh_token: refresh_token.map(ToString::to_string),
        expires_at: Utc::now() + Duration::hours(1),
    }
}

/// Expired a minute ago.
pub fn stale(access_token: &str, refresh_token: Option<&str>) -> TokenRecord {
    TokenRecord {
        expires_at: Utc::now() - Duration::minutes(1),
        ..fresh(access_token, refresh_token)
    }
}

/// Both providers fully configured.
pub fn configured() -> ConnectorConfig {
    ConnectorConfig {
        airtable: ProviderSettings::new(
            "at-client",
            "at-secret",
            "http://localhost:3000/oauth/airtable/callback",
        ),
        ebay: ProviderSettings::new("eb-client", "eb-secret", "Seller-RuName-1"),
        ..ConnectorConfig::default()
    }
}

/// Clients whose token endpoints live on the mock server.
pub fn mock_clients(server_uri: &str) -> Vec<Arc<dyn TokenClient>> {
    let http = reqwest::Client::new();
    vec![
        Arc::new(
            AirtableOAuth::new(http.clone())
                .with_token_url(format!("{server_uri}/oauth2/v1/token")),
        ),
        Arc::new(
            EbayOAuth::new(http)
                .with_authorize_url(format!("{server_uri}/oauth2/authorize"))
                .with_token_url(format!("{server_uri}/identity/v1/oauth2/token")),
        ),
    ]
}

pub fn manager(
    store: Arc<InMemoryTokenStore>,
    config: ConnectorConfig,
    server_uri: &str,
) -> Arc<TokenManager> {
    Arc::new(TokenManager::new(
        store,
        Arc::new(StaticConfigSource::new(config)),
        mock_clients(server_uri),
    ))
}
