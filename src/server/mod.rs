//! HTTP surface: OAuth redirect/callback routes plus status and Airtable
//! lookup endpoints.

mod api;
mod oauth;

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{delete, get};
use axum::Router;
use tracing::{info, warn};

use crate::airtable::AirtableApi;
use crate::auth::providers::default_clients;
use crate::auth::{AuthService, FileTokenStore, HandshakeSealer, TokenManager, TokenStoreConfig};
use crate::config::{ConfigSource, ConnectorConfig};
use crate::error::ConnectorError;

pub use oauth::{clear_cookie_header, handshake_cookie_header, read_cookie, status_redirect_url};

/// Timeout applied to every outbound provider request.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared state handed to every handler.
pub struct AppState {
    pub auth: AuthService,
    pub airtable: AirtableApi,
}

impl AppState {
    pub fn new(auth: AuthService, airtable: AirtableApi) -> Self {
        Self { auth, airtable }
    }

    pub fn manager(&self) -> &Arc<TokenManager> {
        self.auth.manager()
    }

    /// Production wiring: file store under the configured data directory,
    /// both provider clients, one shared HTTP client.
    pub fn from_source(source: Arc<dyn ConfigSource>) -> Result<Self, ConnectorError> {
        let config = source.resolve();
        let http = http_client()?;
        let store = Arc::new(FileTokenStore::new(TokenStoreConfig::new(&config.data_dir)));
        let manager = Arc::new(TokenManager::new(
            store,
            source,
            default_clients(http.clone()),
        ));
        let auth = AuthService::new(manager.clone(), sealer_for(&config));
        let airtable = AirtableApi::new(http, manager);
        Ok(Self::new(auth, airtable))
    }
}

pub type SharedState = Arc<AppState>;

pub fn http_client() -> Result<reqwest::Client, ConnectorError> {
    Ok(reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?)
}

fn sealer_for(config: &ConnectorConfig) -> HandshakeSealer {
    match config.session_secret.as_deref() {
        Some(secret) => HandshakeSealer::new(secret.as_bytes()),
        None => {
            warn!("SESSION_SECRET is not set; handshakes in flight will not survive a restart");
            HandshakeSealer::ephemeral()
        }
    }
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(api::index))
        // ── OAuth ────────────────────────────────────────────────────────
        .route("/oauth/status", get(oauth::status))
        .route("/oauth/{provider}", get(oauth::authorize))
        .route("/oauth/{provider}", delete(oauth::disconnect))
        .route("/oauth/{provider}/callback", get(oauth::callback))
        // ── API ──────────────────────────────────────────────────────────
        .route("/api/status", get(api::live_status))
        .route("/api/airtable/bases", get(api::airtable_bases))
        .route("/api/airtable/tables/{base_id}", get(api::airtable_tables))
        .route("/api/airtable/fields/{base_id}/{table}", get(api::airtable_fields))
        .with_state(state)
}

/// Bind and serve until Ctrl-C.
pub async fn serve(state: SharedState, address: &str) -> Result<(), ConnectorError> {
    let listener = tokio::net::TcpListener::bind(address).await?;
    info!(address = %listener.local_addr()?, "listing connector listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;
    Ok(())
}
