use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::error::AuthError;
use super::providers::TokenClient;
use super::store::TokenStore;
use super::token::{ProviderId, TokenRecord};
use crate::config::{ConfigSource, ConnectorConfig};

/// Whether each provider currently has a stored, non-empty access token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub airtable: bool,
    pub ebay: bool,
}

impl ConnectionStatus {
    pub fn set(&mut self, provider: ProviderId, connected: bool) {
        match provider {
            ProviderId::Airtable => self.airtable = connected,
            ProviderId::Ebay => self.ebay = connected,
        }
    }
}

/// Expiry-aware access to each provider's access token.
///
/// Owns every write to the token store. Refreshes are serialized per
/// provider: concurrent callers that find the same stale record wait for one
/// refresh and then read its result from the store.
pub struct TokenManager {
    store: Arc<dyn TokenStore>,
    config: Arc<dyn ConfigSource>,
    clients: HashMap<ProviderId, Arc<dyn TokenClient>>,
    refresh_locks: RefreshLocks,
}

#[derive(Default)]
struct RefreshLocks {
    airtable: Mutex<()>,
    ebay: Mutex<()>,
}

impl RefreshLocks {
    fn get(&self, provider: ProviderId) -> &Mutex<()> {
        match provider {
            ProviderId::Airtable => &self.airtable,
            ProviderId::Ebay => &self.ebay,
        }
    }
}

impl TokenManager {
    pub fn new(
        store: Arc<dyn TokenStore>,
        config: Arc<dyn ConfigSource>,
        clients: impl IntoIterator<Item = Arc<dyn TokenClient>>,
    ) -> Self {
        let clients: HashMap<_, _> = clients
            .into_iter()
            .map(|client| (client.provider(), client))
            .collect();
        Self {
            store,
            config,
            clients,
            refresh_locks: RefreshLocks::default(),
        }
    }

    /// Current configuration snapshot.
    pub fn config(&self) -> ConnectorConfig {
        self.config.resolve()
    }

    pub fn client(&self, provider: ProviderId) -> Result<&Arc<dyn TokenClient>, AuthError> {
        self.clients
            .get(&provider)
            .ok_or_else(|| AuthError::UnknownProvider(provider.to_string()))
    }

    /// Stored record, with store failures read as "no record".
    pub fn load(&self, provider: ProviderId) -> Option<TokenRecord> {
        match self.store.load(provider) {
            Ok(record) => record,
            Err(err) => {
                warn!(provider = %provider, error = %err, "token store read failed, treating as not connected");
                None
            }
        }
    }

    /// A currently valid access token, refreshing it if it expires within
    /// the freshness buffer.
    ///
    /// `None` means the provider must be re-authorized through the handshake.
    pub async fn valid_access_token(&self, provider: ProviderId) -> Option<String> {
        match self.access_token(provider).await {
            Ok(token) => Some(token),
            Err(AuthError::NotConnected(_)) => {
                debug!(provider = %provider, "no usable credentials");
                None
            }
            Err(err) => {
                warn!(provider = %provider, error = %err, "token refresh failed");
                None
            }
        }
    }

    /// Like [`valid_access_token`](Self::valid_access_token) but reports why
    /// no token is available.
    pub async fn access_token(&self, provider: ProviderId) -> Result<String, AuthError> {
        let record = self
            .load(provider)
            .filter(TokenRecord::has_access_token)
            .ok_or(AuthError::NotConnected(provider))?;
        if record.is_fresh() {
            return Ok(record.access_token);
        }
        self.refresh_stale(provider).await.map(|r| r.access_token)
    }

    /// Refresh now, regardless of the stored expiry.
    pub async fn refresh(&self, provider: ProviderId) -> Result<TokenRecord, AuthError> {
        let _guard = self.lock(provider).lock().await;
        let record = self
            .load(provider)
            .ok_or(AuthError::NotConnected(provider))?;
        self.refresh_record(provider, record).await
    }

    async fn refresh_stale(&self, provider: ProviderId) -> Result<TokenRecord, AuthError> {
        let _guard = self.lock(provider).lock().await;
        // Another caller may have refreshed while this one waited.
        let record = self
            .load(provider)
            .ok_or(AuthError::NotConnected(provider))?;
        if record.is_fresh() {
            debug!(provider = %provider, "token refreshed by a concurrent caller");
            return Ok(record);
        }
        self.refresh_record(provider, record).await
    }

    async fn refresh_record(
        &self,
        provider: ProviderId,
        record: TokenRecord,
    ) -> Result<TokenRecord, AuthError> {
        let refresh_token = record
            .refresh_token
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::NotConnected(provider))?;
        let client = self.client(provider)?;
        let config = self.config.resolve();

        let refreshed = client.refresh(&config, &refresh_token).await?;
        self.store.save(provider, &refreshed)?;
        info!(provider = %provider, expires_at = %refreshed.expires_at, "access token refreshed");
        Ok(refreshed)
    }

    /// Persist the record produced by a completed authorization handshake,
    /// replacing any previous one.
    pub async fn record_exchange(
        &self,
        provider: ProviderId,
        record: &TokenRecord,
    ) -> Result<(), AuthError> {
        let _guard = self.lock(provider).lock().await;
        self.store.save(provider, record)?;
        info!(provider = %provider, expires_at = %record.expires_at, "tokens stored");
        Ok(())
    }

    /// Forget a provider's credentials. The other provider is untouched.
    pub async fn disconnect(&self, provider: ProviderId) -> Result<(), AuthError> {
        let _guard = self.lock(provider).lock().await;
        self.store.clear(provider)?;
        info!(provider = %provider, "provider disconnected");
        Ok(())
    }

    pub fn is_connected(&self, provider: ProviderId) -> bool {
        self.load(provider)
            .is_some_and(|record| record.has_access_token())
    }

    /// Stored-token presence per provider. Never refreshes.
    pub fn status(&self) -> ConnectionStatus {
        let mut status = ConnectionStatus::default();
        for provider in ProviderId::all() {
            status.set(provider, self.is_connected(provider));
        }
        status
    }

    /// Whether each provider can produce a valid access token right now.
    /// May refresh; providers are checked concurrently.
    pub async fn live_status(&self) -> ConnectionStatus {
        let (airtable, ebay) = futures::join!(
            self.valid_access_token(ProviderId::Airtable),
            self.valid_access_token(ProviderId::Ebay)
        );
        ConnectionStatus {
            airtable: airtable.is_some(),
            ebay: ebay.is_some(),
        }
    }

    fn lock(&self, provider: ProviderId) -> &Mutex<()> {
        self.refresh_locks.get(provider)
    }
}
