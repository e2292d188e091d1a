use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::SystemTime;

const CONFIG_FILE_NAME: &str = "config.toml";
const API_KEY_ENV: &str = "RAWG_API_KEY";

/// Remote service's documented page size ceiling.
pub const MAX_PAGE_SIZE: u32 = 40;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub cache: CacheConfig,
    pub sync: SyncConfig,
    pub storage: StorageConfig,
}

/// Remote catalog connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the catalog API
    pub base_url: String,
    /// API key sent as the `key` query parameter
    pub api_key: String,
    /// Connect/read timeout per request, in seconds
    pub timeout_secs: u64,
    /// Default page size for list requests (1-40)
    pub page_size: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.rawg.io/api".to_string(),
            api_key: String::new(),
            timeout_secs: 30,
            page_size: 20,
        }
    }
}

impl ApiConfig {
    pub fn is_key_configured(&self) -> bool {
        let key = self.api_key.trim();
        !key.is_empty() && key != "YOUR_API_KEY_HERE" && key.len() > 10
    }

    /// Key with everything but the first and last four characters hidden.
    pub fn masked_key(&self) -> String {
        let key = self.api_key.trim();
        if key.chars().count() < 8 {
            return "not configured".to_string();
        }
        let head: String = key.chars().take(4).collect();
        let tail: String = key.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
        format!("{}****{}", head, tail)
    }
}

/// Freshness policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// How long a refreshed bucket stays fresh, in hours
    pub ttl_hours: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_hours: 24 }
    }
}

/// Bulk and enrichment tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Maximum in-flight detail lookups during enrichment
    pub enrichment_concurrency: usize,
    /// Maximum in-flight page/category fetches during bulk population
    pub bulk_concurrency: usize,
    /// Page size used by multi-page population
    pub bulk_page_size: u32,
    /// Items fetched per category during category population
    pub category_page_size: u32,
    /// Cap on stored descriptions, in characters
    pub description_max_chars: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enrichment_concurrency: 5,
            bulk_concurrency: 4,
            bulk_page_size: 20,
            category_page_size: 15,
            description_max_chars: crate::catalog::DESCRIPTION_MAX_CHARS,
        }
    }
}

/// Local store location
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Catalog database path (empty = default data dir)
    pub db_path: Option<String>,
}

impl StorageConfig {
    pub fn resolve_db_path(&self) -> Result<PathBuf> {
        if let Some(ref custom) = self.db_path {
            if !custom.trim().is_empty() {
                return Ok(PathBuf::from(custom));
            }
        }
        let data_dir = dirs::data_dir()
            .context("Failed to get data directory")?
            .join("gamevault");
        fs::create_dir_all(&data_dir).context("Failed to create data directory")?;
        Ok(data_dir.join("catalog.redb"))
    }
}

impl Config {
    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("gamevault");

        fs::create_dir_all(&config_dir).context("Failed to create config directory")?;

        Ok(config_dir.join(CONFIG_FILE_NAME))
    }

    /// Load configuration from the default path, creating it if missing
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from `path`, or write defaults there if it does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = fs::read_to_string(path).context("Failed to read config file")?;
            toml::from_str(&contents).context("Failed to parse config file")?
        } else {
            let config = Config::default();
            config.save_to(path)?;
            config
        };
        config.apply_env();
        Ok(config)
    }

    /// Save configuration to `path`
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        fs::write(path, contents).context("Failed to write config file")?;
        Ok(())
    }

    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                self.api.api_key = key.trim().to_string();
            }
        }
    }

    /// Page size clamped into the range the remote accepts
    pub fn effective_page_size(&self) -> u32 {
        self.api.page_size.clamp(1, MAX_PAGE_SIZE)
    }

    /// Generate example config content for documentation
    pub fn example_config() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Live configuration shared between components.
///
/// Readers take a snapshot on every use, so edits made through
/// [`SharedConfig::update`] or picked up by [`SharedConfig::reload_if_changed`]
/// apply on the next read.
#[derive(Debug, Clone)]
pub struct SharedConfig {
    inner: Arc<RwLock<Config>>,
    source: Option<PathBuf>,
    last_modified: Arc<Mutex<Option<SystemTime>>>,
}

impl SharedConfig {
    pub fn new(config: Config) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
            source: None,
            last_modified: Arc::new(Mutex::new(None)),
        }
    }

    /// Load from `path` and remember it for later reloads.
    pub fn from_file(path: &Path) -> Result<Self> {
        let config = Config::load_from(path)?;
        let modified = fs::metadata(path).and_then(|m| m.modified()).ok();
        Ok(Self {
            inner: Arc::new(RwLock::new(config)),
            source: Some(path.to_path_buf()),
            last_modified: Arc::new(Mutex::new(modified)),
        })
    }

    pub fn snapshot(&self) -> Config {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn cache_ttl_hours(&self) -> u64 {
        match self.inner.read() {
            Ok(guard) => guard.cache.ttl_hours,
            Err(poisoned) => poisoned.into_inner().cache.ttl_hours,
        }
    }

    pub fn update(&self, f: impl FnOnce(&mut Config)) {
        let mut guard = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard);
    }

    /// Re-read the backing file if its modification time moved.
    /// Returns true when a new configuration was applied.
    pub fn reload_if_changed(&self) -> Result<bool> {
        let Some(ref path) = self.source else {
            return Ok(false);
        };
        let modified = fs::metadata(path)
            .and_then(|m| m.modified())
            .context("Failed to stat config file")?;

        let mut last = self
            .last_modified
            .lock()
            .map_err(|e| anyhow::anyhow!("lock poisoned: {e}"))?;
        if *last == Some(modified) {
            return Ok(false);
        }

        let config = Config::load_from(path)?;
        self.update(|current| *current = config);
        *last = Some(modified);
        tracing::info!("Configuration reloaded from {}", path.display());
        Ok(true)
    }
}
