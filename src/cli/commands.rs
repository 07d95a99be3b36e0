//! CLI command handlers for serve, status, and disconnect.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use crate::auth::{FileTokenStore, ProviderId, TokenRecord, TokenStore, TokenStoreConfig};
use crate::config::{ConfigSource, ConnectorConfig, EnvConfigSource};
use crate::server::{self, AppState};

/// Configuration source honoring command-line overrides.
///
/// Without overrides the environment is re-read on every resolve.
pub fn config_source(
    data_dir: Option<PathBuf>,
    host: Option<String>,
    port: Option<u16>,
) -> Arc<dyn ConfigSource> {
    let env = EnvConfigSource::new();
    if data_dir.is_none() && host.is_none() && port.is_none() {
        return Arc::new(env);
    }
    Arc::new(OverrideSource {
        inner: env,
        data_dir,
        host,
        port,
    })
}

struct OverrideSource {
    inner: EnvConfigSource,
    data_dir: Option<PathBuf>,
    host: Option<String>,
    port: Option<u16>,
}

impl ConfigSource for OverrideSource {
    fn resolve(&self) -> ConnectorConfig {
        let mut config = self.inner.resolve();
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        config
    }
}

/// Handle `listing-connector serve`.
pub async fn handle_serve(source: Arc<dyn ConfigSource>) -> Result<(), Box<dyn std::error::Error>> {
    let config = source.resolve();
    for provider in ProviderId::all() {
        if let Err(err) = config.credentials(provider) {
            tracing::warn!(provider = %provider, "{err}; its connect route will report the missing settings");
        }
    }
    let address = config.bind_address();
    let state = Arc::new(AppState::from_source(source)?);
    server::serve(state, &address).await?;
    Ok(())
}

/// Handle `listing-connector status`.
pub fn handle_status(source: &dyn ConfigSource) -> Result<(), Box<dyn std::error::Error>> {
    let config = source.resolve();
    let store = file_store(&config);

    println!("🔐 Connection Status ({})\n", store.path().display());
    for provider in ProviderId::all() {
        let line = match store.load(provider) {
            Ok(Some(record)) => describe_record(&record),
            Ok(None) => "❌ Not connected".to_string(),
            Err(e) => format!("⚠️  Error: {e}"),
        };
        println!("  {}: {line}", provider.display_name());
    }

    println!("\n📌 Configuration:");
    for provider in ProviderId::all() {
        let status = match config.credentials(provider) {
            Ok(_) => "✅ Configured".to_string(),
            Err(e) => format!("❌ {e}"),
        };
        println!("  {}: {status}", provider.display_name());
    }
    println!("  eBay environment: {}", config.ebay_environment.as_str());
    Ok(())
}

/// Handle `listing-connector disconnect <provider>`.
pub fn handle_disconnect(
    source: &dyn ConfigSource,
    provider: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let Ok(provider) = ProviderId::from_str(provider.trim().to_ascii_lowercase().as_str()) else {
        eprintln!("Unknown provider: {provider}");
        eprintln!("Supported: airtable, ebay");
        std::process::exit(1);
    };
    let store = file_store(&source.resolve());
    store.clear(provider)?;
    println!("✅ {} disconnected", provider.display_name());
    Ok(())
}

fn file_store(config: &ConnectorConfig) -> FileTokenStore {
    FileTokenStore::new(TokenStoreConfig::new(&config.data_dir))
}

fn describe_record(record: &TokenRecord) -> String {
    let expiry = record.expires_at.format("%Y-%m-%d %H:%M UTC");
    let refresh = if record.refresh_token.is_some() {
        ""
    } else {
        ", no refresh token"
    };
    if let Some(remaining) = record.time_until_expiry() {
        format!(
            "✅ Connected (expires in {} min{refresh})",
            remaining.num_minutes()
        )
    } else if record.refresh_token.is_some() {
        format!("⚠️  Access token expired {expiry} (will refresh on next use)")
    } else {
        format!("⚠️  Access token expired {expiry}{refresh}, reconnect required")
    }
}
