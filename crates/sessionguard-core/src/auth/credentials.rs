use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use keyring::Entry;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

/// Default service name for keychain entries
pub const SERVICE_NAME: &str = "sessionguard";

/// Application directory under the platform data dir
const APP_DIR: &str = "sessionguard";

/// Credential file name in the data directory
const CREDENTIALS_FILE: &str = "credentials.json";

/// Which credential a caller is acting with.
///
/// The two kinds live under separate storage keys and never affect each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "lowercase")]
pub enum CredentialKind {
    User,
    Admin,
}

impl CredentialKind {
    /// Map the `isAdmin` flag used by API callers onto a credential kind
    pub fn from_admin_flag(is_admin: bool) -> Self {
        if is_admin {
            CredentialKind::Admin
        } else {
            CredentialKind::User
        }
    }

    /// Canonical storage key, shared by every component
    pub fn storage_key(self) -> &'static str {
        match self {
            CredentialKind::User => "authToken",
            CredentialKind::Admin => "adminToken",
        }
    }

    pub fn is_admin(self) -> bool {
        matches!(self, CredentialKind::Admin)
    }
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialKind::User => f.write_str("user"),
            CredentialKind::Admin => f.write_str("admin"),
        }
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Credential file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Credential file is malformed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Keychain error: {0}")]
    Keyring(#[from] keyring::Error),
}

/// Persistent key/value store for the user and admin tokens.
///
/// Presence of a non-empty token is the only proof of authentication; nothing
/// here inspects or verifies token contents.
pub trait CredentialStore: Send + Sync {
    /// Return the stored token, if any
    fn get(&self, kind: CredentialKind) -> Result<Option<String>, StoreError>;

    /// Persist a token, replacing any previous value
    fn set(&self, kind: CredentialKind, token: &str) -> Result<(), StoreError>;

    /// Remove a token. Removing an absent token is not an error.
    fn clear(&self, kind: CredentialKind) -> Result<(), StoreError>;

    /// Check whether a usable (non-empty) token is stored
    fn has(&self, kind: CredentialKind) -> Result<bool, StoreError> {
        Ok(self.token(kind)?.is_some())
    }

    /// Like `get`, but an empty string reads as absent
    fn token(&self, kind: CredentialKind) -> Result<Option<String>, StoreError> {
        Ok(self.get(kind)?.filter(|t| !t.is_empty()))
    }

    /// When the credential was written. Backends that keep no metadata
    /// return `None`.
    fn stored_at(&self, _kind: CredentialKind) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(None)
    }
}

// ============================================================================
// In-memory store
// ============================================================================

/// Process-local store. Contents are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tokens: Mutex<HashMap<CredentialKind, StoredCredential>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryStore {
    fn get(&self, kind: CredentialKind) -> Result<Option<String>, StoreError> {
        let tokens = self.tokens.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(tokens.get(&kind).map(|c| c.token.clone()))
    }

    fn set(&self, kind: CredentialKind, token: &str) -> Result<(), StoreError> {
        let mut tokens = self.tokens.lock().unwrap_or_else(PoisonError::into_inner);
        tokens.insert(kind, StoredCredential::new(token));
        Ok(())
    }

    fn clear(&self, kind: CredentialKind) -> Result<(), StoreError> {
        let mut tokens = self.tokens.lock().unwrap_or_else(PoisonError::into_inner);
        tokens.remove(&kind);
        Ok(())
    }

    fn stored_at(&self, kind: CredentialKind) -> Result<Option<DateTime<Utc>>, StoreError> {
        let tokens = self.tokens.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(tokens.get(&kind).map(|c| c.stored_at))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredCredential {
    pub token: String,
    pub stored_at: DateTime<Utc>,
}

impl StoredCredential {
    fn new(token: &str) -> Self {
        Self {
            token: token.to_string(),
            stored_at: Utc::now(),
        }
    }
}

// ============================================================================
// File-backed store
// ============================================================================

/// JSON file keyed by storage key. Every call re-reads the file so that
/// tokens written or cleared by another process are picked up.
///
/// Writes go to a temporary file in the same directory which is then renamed
/// over the target, so a concurrent reader sees either the old document or
/// the new one and never a truncated file.
pub struct FileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// `<data_dir>/sessionguard/credentials.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|dir| dir.join(APP_DIR).join(CREDENTIALS_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, StoredCredential>, StoreError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents = std::fs::read_to_string(&self.path)?;
        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_str(&contents)?)
    }

    fn save(&self, doc: &BTreeMap<String, StoredCredential>) -> Result<(), StoreError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        let contents = serde_json::to_string_pretty(doc)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(contents.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

impl CredentialStore for FileStore {
    fn get(&self, kind: CredentialKind) -> Result<Option<String>, StoreError> {
        Ok(self.load()?.remove(kind.storage_key()).map(|c| c.token))
    }

    fn set(&self, kind: CredentialKind, token: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut doc = self.load()?;
        doc.insert(kind.storage_key().to_string(), StoredCredential::new(token));
        self.save(&doc)?;
        debug!(kind = %kind, path = %self.path.display(), "Credential written");
        Ok(())
    }

    fn clear(&self, kind: CredentialKind) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut doc = self.load()?;
        if doc.remove(kind.storage_key()).is_some() {
            self.save(&doc)?;
            debug!(kind = %kind, path = %self.path.display(), "Credential removed");
        }
        Ok(())
    }

    fn stored_at(&self, kind: CredentialKind) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(self.load()?.get(kind.storage_key()).map(|c| c.stored_at))
    }
}

// ============================================================================
// OS keychain store
// ============================================================================

/// Stores each credential as a keychain entry named after its storage key.
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, kind: CredentialKind) -> Result<Entry, StoreError> {
        Ok(Entry::new(&self.service, kind.storage_key())?)
    }
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new(SERVICE_NAME)
    }
}

impl CredentialStore for KeyringStore {
    fn get(&self, kind: CredentialKind) -> Result<Option<String>, StoreError> {
        match self.entry(kind)?.get_password() {
            Ok(token) => Ok(Some(token)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, kind: CredentialKind, token: &str) -> Result<(), StoreError> {
        self.entry(kind)?.set_password(token)?;
        Ok(())
    }

    fn clear(&self, kind: CredentialKind) -> Result<(), StoreError> {
        match self.entry(kind)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
