//! Connector configuration resolved from the environment.
//!
//! Configuration is resolved per operation through a [`ConfigSource`], so a
//! rotated client secret or a switched eBay environment is picked up by the
//! next handshake or refresh without a restart.

use std::fmt;
use std::path::PathBuf;
use std::sync::Once;

use crate::auth::{AuthError, ProviderId};

static DOTENV: Once = Once::new();

const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_STATUS_REDIRECT: &str = "/";

/// Load `.env` into the process environment once. Missing files are ignored.
pub fn load_dotenv() {
    DOTENV.call_once(|| {
        let _ = dotenvy::dotenv();
    });
}

/// Which eBay deployment the connector talks to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EbayEnvironment {
    #[default]
    Sandbox,
    Production,
}

impl EbayEnvironment {
    /// Exactly `production` selects production; anything else, including unset, is sandbox.
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("production") => Self::Production,
            _ => Self::Sandbox,
        }
    }

    pub fn authorize_url(&self) -> &'static str {
        match self {
            Self::Sandbox => "https://auth.sandbox.ebay.com/oauth2/authorize",
            Self::Production => "https://auth.ebay.com/oauth2/authorize",
        }
    }

    pub fn token_url(&self) -> &'static str {
        match self {
            Self::Sandbox => "https://api.sandbox.ebay.com/identity/v1/oauth2/token",
            Self::Production => "https://api.ebay.com/identity/v1/oauth2/token",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sandbox => "sandbox",
            Self::Production => "production",
        }
    }
}

/// Validated client credentials for one provider.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("redirect_uri", &self.redirect_uri)
            .finish()
    }
}

/// Raw, possibly incomplete settings for one provider.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ProviderSettings {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
}

impl ProviderSettings {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            client_id: Some(client_id.into()),
            client_secret: Some(client_secret.into()),
            redirect_uri: Some(redirect_uri.into()),
        }
    }

    /// Require client id, secret and redirect URI.
    ///
    /// The error names every missing environment variable for `provider`.
    pub fn credentials(&self, provider: ProviderId) -> Result<ClientCredentials, AuthError> {
        let prefix = env_prefix(provider);
        let mut missing = Vec::new();
        let client_id = present(&self.client_id, &mut missing, prefix, "CLIENT_ID");
        let client_secret = present(&self.client_secret, &mut missing, prefix, "CLIENT_SECRET");
        let redirect_uri = present(&self.redirect_uri, &mut missing, prefix, "REDIRECT_URI");
        match (client_id, client_secret, redirect_uri) {
            (Some(client_id), Some(client_secret), Some(redirect_uri)) => Ok(ClientCredentials {
                client_id,
                client_secret,
                redirect_uri,
            }),
            _ => Err(AuthError::Configuration { missing }),
        }
    }
}

impl fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("redirect_uri", &self.redirect_uri)
            .finish()
    }
}

fn present(
    value: &Option<String>,
    missing: &mut Vec<String>,
    prefix: &str,
    suffix: &str,
) -> Option<String> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Some(v.to_string()),
        _ => {
            missing.push(format!("{prefix}_{suffix}"));
            None
        }
    }
}

fn env_prefix(provider: ProviderId) -> &'static str {
    match provider {
        ProviderId::Airtable => "AIRTABLE",
        ProviderId::Ebay => "EBAY",
    }
}

/// Immutable snapshot of everything the connector reads from its environment.
#[derive(Clone)]
pub struct ConnectorConfig {
    pub airtable: ProviderSettings,
    pub ebay: ProviderSettings,
    pub ebay_environment: EbayEnvironment,
    pub data_dir: PathBuf,
    pub host: String,
    pub port: u16,
    /// Where callbacks send the browser, with `{provider}=ok` or `{provider}_error=..` appended.
    pub status_redirect_url: String,
    pub session_secret: Option<String>,
    pub cookie_secure: bool,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            airtable: ProviderSettings::default(),
            ebay: ProviderSettings::default(),
            ebay_environment: EbayEnvironment::default(),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            status_redirect_url: DEFAULT_STATUS_REDIRECT.to_string(),
            session_secret: None,
            cookie_secure: false,
        }
    }
}

impl fmt::Debug for ConnectorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectorConfig")
            .field("airtable", &self.airtable)
            .field("ebay", &self.ebay)
            .field("ebay_environment", &self.ebay_environment)
            .field("data_dir", &self.data_dir)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("status_redirect_url", &self.status_redirect_url)
            .field(
                "session_secret",
                &self.session_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("cookie_secure", &self.cookie_secure)
            .finish()
    }
}

impl ConnectorConfig {
    /// Read the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let port = match get("PORT") {
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                tracing::warn!(value = %raw, "PORT is not a valid port number, using {DEFAULT_PORT}");
                DEFAULT_PORT
            }),
            None => DEFAULT_PORT,
        };

        Self {
            airtable: ProviderSettings {
                client_id: get("AIRTABLE_CLIENT_ID"),
                client_secret: get("AIRTABLE_CLIENT_SECRET"),
                redirect_uri: get("AIRTABLE_REDIRECT_URI"),
            },
            ebay: ProviderSettings {
                client_id: get("EBAY_CLIENT_ID"),
                client_secret: get("EBAY_CLIENT_SECRET"),
                redirect_uri: get("EBAY_REDIRECT_URI"),
            },
            ebay_environment: EbayEnvironment::parse(get("EBAY_ENVIRONMENT").as_deref()),
            data_dir: get("CONNECTOR_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            host: get("HOST").unwrap_or(defaults.host),
            port,
            status_redirect_url: get("STATUS_REDIRECT_URL").unwrap_or(defaults.status_redirect_url),
            session_secret: get("SESSION_SECRET"),
            cookie_secure: get("COOKIE_SECURE")
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
        }
    }

    pub fn provider(&self, provider: ProviderId) -> &ProviderSettings {
        match provider {
            ProviderId::Airtable => &self.airtable,
            ProviderId::Ebay => &self.ebay,
        }
    }

    pub fn credentials(&self, provider: ProviderId) -> Result<ClientCredentials, AuthError> {
        self.provider(provider).credentials(provider)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Source of the current configuration, consulted at the start of every
/// handshake, exchange and refresh.
pub trait ConfigSource: Send + Sync {
    fn resolve(&self) -> ConnectorConfig;
}

/// Re-reads the process environment on every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvConfigSource;

impl EnvConfigSource {
    pub fn new() -> Self {
        load_dotenv();
        Self
    }
}

impl ConfigSource for EnvConfigSource {
    fn resolve(&self) -> ConnectorConfig {
        ConnectorConfig::from_env()
    }
}

/// Always returns the same configuration.
#[derive(Debug, Clone)]
pub struct StaticConfigSource {
    config: ConnectorConfig,
}

impl StaticConfigSource {
    pub fn new(config: ConnectorConfig) -> Self {
        Self { config }
    }
}

impl ConfigSource for StaticConfigSource {
    fn resolve(&self) -> ConnectorConfig {
        self.config.clone()
    }
}
