use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
#[cfg(unix)]
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;
use tracing::{debug, warn};

use super::error::AuthError;
use super::token::{ProviderId, TokenRecord};

/// File name of the persisted token document inside the data directory.
pub const TOKENS_FILE_NAME: &str = "tokens.json";

/// Storage abstraction for persisted OAuth tokens, one record per provider.
pub trait TokenStore: Send + Sync {
    fn load(&self, provider: ProviderId) -> Result<Option<TokenRecord>, AuthError>;
    fn save(&self, provider: ProviderId, record: &TokenRecord) -> Result<(), AuthError>;
    fn clear(&self, provider: ProviderId) -> Result<(), AuthError>;
}

/// Configuration for file-backed token storage.
#[derive(Debug, Clone)]
pub struct TokenStoreConfig {
    pub data_dir: PathBuf,
}

impl TokenStoreConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }
}

/// Token store backed by a single JSON document keyed by provider id.
///
/// Every write reads the whole document, replaces one provider's entry and
/// writes the document back through a temp file and rename, so saving one
/// provider never drops another provider's record. Writes within one process
/// are serialized; separate processes sharing a data directory are not
/// supported.
///
/// A missing, unreadable or corrupt document reads as "no record".
///
/// # Example
/// ```no_run
/// use chrono::Duration;
/// use listing_connector::auth::{FileTokenStore, ProviderId, TokenRecord, TokenStore, TokenStoreConfig};
///
/// let store = FileTokenStore::new(TokenStoreConfig::new("./data"));
/// let record = TokenRecord::issued("access", Some("refresh".into()), Duration::hours(2));
/// store.save(ProviderId::Ebay, &record)?;
/// # Ok::<(), listing_connector::auth::AuthError>(())
/// ```
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileTokenStore {
    pub fn new(config: TokenStoreConfig) -> Self {
        Self {
            path: config.data_dir.join(TOKENS_FILE_NAME),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> BTreeMap<String, Value> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "token file unreadable, treating as empty");
                return BTreeMap::new();
            }
        };
        if raw.trim().is_empty() {
            return BTreeMap::new();
        }
        match serde_json::from_str::<BTreeMap<String, Value>>(&raw) {
            Ok(document) => document,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "token file is corrupt, treating as empty");
                BTreeMap::new()
            }
        }
    }

    fn update<F>(&self, apply: F) -> Result<(), AuthError>
    where
        F: FnOnce(&mut BTreeMap<String, Value>) -> Result<(), AuthError>,
    {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut document = self.read_document();
        apply(&mut document)?;
        let serialized = serde_json::to_vec_pretty(&document)?;
        atomic_write(&self.path, &serialized)
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self, provider: ProviderId) -> Result<Option<TokenRecord>, AuthError> {
        let mut document = self.read_document();
        let Some(value) = document.remove(provider.as_ref()) else {
            return Ok(None);
        };
        if value.is_null() {
            return Ok(None);
        }
        match serde_json::from_value::<TokenRecord>(value) {
            Ok(record) => Ok(Some(record)),
            Err(err) => {
                warn!(provider = %provider, error = %err, "stored token record is malformed, ignoring it");
                Ok(None)
            }
        }
    }

    fn save(&self, provider: ProviderId, record: &TokenRecord) -> Result<(), AuthError> {
        self.update(|document| {
            document.insert(provider.to_string(), serde_json::to_value(record)?);
            Ok(())
        })?;
        debug!(provider = %provider, path = %self.path.display(), "token record saved");
        Ok(())
    }

    fn clear(&self, provider: ProviderId) -> Result<(), AuthError> {
        if !self.path.exists() {
            return Ok(());
        }
        self.update(|document| {
            document.remove(provider.as_ref());
            Ok(())
        })
    }
}

fn atomic_write(path: &Path, data: &[u8]) -> Result<(), AuthError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let file_name = path.file_name().ok_or_else(|| {
        AuthError::Io(format!("Token path {} has no file name", path.display()))
    })?;

    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let temp_name = format!(
        ".{}.tmp-{}-{nonce}",
        file_name.to_string_lossy(),
        std::process::id()
    );
    let temp_path = path.with_file_name(temp_name);

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);

    let write_result = (|| -> std::io::Result<()> {
        let mut temp_file = options.open(&temp_path)?;
        temp_file.write_all(data)?;
        temp_file.sync_all()?;
        Ok(())
    })();

    if let Err(err) = write_result {
        let _ = fs::remove_file(&temp_path);
        return Err(err.into());
    }

    if let Err(err) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(err.into());
    }

    #[cfg(unix)]
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;

    Ok(())
}
