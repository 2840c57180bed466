use anyhow::{bail, Context};
use ometrics_storage::memory::MemoryStorageConfig;
use ometrics_storage::sqlite::SqliteStorageConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Snapshot period of the in-memory store; 0 writes after every update.
    #[serde(default = "default_store_interval_secs")]
    pub store_interval_secs: u64,
    /// Snapshot file of the in-memory store; empty disables snapshots.
    #[serde(default = "default_file_storage_path")]
    pub file_storage_path: String,
    #[serde(default)]
    pub restore: bool,
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Shared HMAC key for request and response signatures.
    #[serde(default)]
    pub signing_key: Option<String>,
}

/// SQLite backend settings. The backend is used only when `path` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    #[serde(default = "default_source")]
    pub source: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            busy_timeout_ms: default_busy_timeout_ms(),
            source: default_source(),
        }
    }
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_store_interval_secs() -> u64 {
    300
}

fn default_file_storage_path() -> String {
    "data/metrics.json".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

fn default_source() -> String {
    "ometrics-server".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            store_interval_secs: default_store_interval_secs(),
            file_storage_path: default_file_storage_path(),
            restore: false,
            database: DatabaseConfig::default(),
            signing_key: None,
        }
    }
}

impl ServerConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read server config '{path}'"))?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Applies `ADDRESS`, `STORE_INTERVAL`, `FILE_STORAGE_PATH`, `RESTORE`,
    /// `DATABASE_PATH` and `KEY` from the process environment.
    pub fn apply_env(self) -> anyhow::Result<Self> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    pub fn apply_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<Self> {
        if let Some(addr) = lookup("ADDRESS") {
            self.listen_addr = addr;
        }
        if let Some(raw) = lookup("STORE_INTERVAL") {
            self.store_interval_secs = raw
                .trim()
                .parse()
                .with_context(|| format!("invalid value '{raw}' for STORE_INTERVAL"))?;
        }
        if let Some(path) = lookup("FILE_STORAGE_PATH") {
            self.file_storage_path = path;
        }
        if let Some(raw) = lookup("RESTORE") {
            self.restore = raw
                .trim()
                .parse()
                .with_context(|| format!("invalid value '{raw}' for RESTORE"))?;
        }
        if let Some(path) = lookup("DATABASE_PATH") {
            self.database.path = Some(path);
        }
        if let Some(key) = lookup("KEY") {
            self.signing_key = Some(key);
        }
        Ok(self)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.listen_addr.trim().is_empty() {
            bail!("listen_addr must not be empty");
        }
        if self.database_path().is_some() && self.database.source.trim().is_empty() {
            bail!("database.source must not be empty");
        }
        Ok(())
    }

    /// Signing key, if one is configured and non-empty.
    pub fn signing_key(&self) -> Option<&str> {
        self.signing_key.as_deref().filter(|k| !k.is_empty())
    }

    pub fn database_path(&self) -> Option<PathBuf> {
        self.database
            .path
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
    }

    pub fn sqlite_storage(&self) -> Option<SqliteStorageConfig> {
        self.database_path().map(|path| SqliteStorageConfig {
            path,
            busy_timeout: Duration::from_millis(self.database.busy_timeout_ms),
            source: self.database.source.clone(),
        })
    }

    pub fn memory_storage(&self) -> MemoryStorageConfig {
        let path = self.file_storage_path.trim();
        MemoryStorageConfig {
            file_path: (!path.is_empty()).then(|| PathBuf::from(path)),
            store_interval: Duration::from_secs(self.store_interval_secs),
            restore: self.restore,
        }
    }
}
