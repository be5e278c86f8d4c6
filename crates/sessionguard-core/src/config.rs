//! Application configuration management.
//!
//! Holds the API base URL, the credential storage backend, the login paths
//! used for hard redirects, and the route table.
//!
//! Configuration is stored at `~/.config/sessionguard/config.json`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::client::{
    ClientSettings, DEFAULT_ADMIN_LOGIN_PATH, DEFAULT_LOGIN_PATH, DEFAULT_REQUEST_TIMEOUT_SECS,
};
use crate::auth::credentials::SERVICE_NAME;
use crate::auth::{CredentialStore, FileStore, KeyringStore, MemoryStore};
use crate::routing::{RouteDef, RouteMeta, RouteTable, ADMIN_LOGIN_ROUTE, LOGIN_ROUTE};

/// Application name used for config directory paths
const APP_NAME: &str = "sessionguard";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Where credentials are persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageBackend {
    /// Lost on exit
    Memory,
    /// JSON file; defaults to the platform data dir
    File {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<PathBuf>,
    },
    /// OS keychain
    Keyring {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        service: Option<String>,
    },
}

impl Default for StorageBackend {
    fn default() -> Self {
        StorageBackend::File { path: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: Option<String>,
    pub request_timeout_secs: u64,
    pub storage: StorageBackend,
    pub login_path: String,
    pub admin_login_path: String,
    pub routes: Vec<RouteDef>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            storage: StorageBackend::default(),
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            admin_login_path: DEFAULT_ADMIN_LOGIN_PATH.to_string(),
            routes: default_routes(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Build the configured credential store
    pub fn open_store(&self) -> Result<Arc<dyn CredentialStore>> {
        let store: Arc<dyn CredentialStore> = match &self.storage {
            StorageBackend::Memory => Arc::new(MemoryStore::new()),
            StorageBackend::File { path } => {
                let path = match path {
                    Some(path) => path.clone(),
                    None => FileStore::default_path()
                        .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?,
                };
                Arc::new(FileStore::new(path))
            }
            StorageBackend::Keyring { service } => Arc::new(KeyringStore::new(
                service.as_deref().unwrap_or(SERVICE_NAME),
            )),
        };
        Ok(store)
    }

    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            base_url: self.api_base_url.clone(),
            timeout: Duration::from_secs(self.request_timeout_secs),
            login_path: self.login_path.clone(),
            admin_login_path: self.admin_login_path.clone(),
        }
    }

    pub fn route_table(&self) -> RouteTable {
        RouteTable::new(self.routes.clone())
    }
}

/// Routes of the stock web front-end
pub fn default_routes() -> Vec<RouteDef> {
    vec![
        RouteDef::new("/").name("home"),
        RouteDef::new("/login").name(LOGIN_ROUTE),
        RouteDef::new("/register").name("register"),
        RouteDef::new("/profile").name("profile").meta(RouteMeta::auth()),
        RouteDef::new("/admin/login").name(ADMIN_LOGIN_ROUTE),
        RouteDef::new("/admin")
            .meta(RouteMeta::admin())
            .children(vec![
                RouteDef::new("").name("admin-dashboard"),
                RouteDef::new("logs").name("admin-logs"),
                RouteDef::new("users").name("admin-users"),
                RouteDef::new("database").name("admin-database"),
                RouteDef::new("health").name("admin-health"),
                RouteDef::new("monitor").name("admin-realtime-monitor"),
            ]),
    ]
}
