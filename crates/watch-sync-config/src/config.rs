use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub library: LibraryConfig,
    #[serde(default)]
    pub history: Option<HistoryConfig>,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub sync: SyncOptions,
    #[serde(default)]
    pub scheduler: Option<SchedulerConfig>,
}

/// Media-library service (Stremio API)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryConfig {
    #[serde(default = "default_library_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Chronological history service (Trakt API)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    pub enabled: bool,
    pub client_id: String,
    #[serde(default = "default_history_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Catalog metadata provider (Cinemeta addon)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataConfig {
    #[serde(default = "default_metadata_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncOptions {
    #[serde(default = "default_true")]
    pub account_sync: bool,
    #[serde(default = "default_true")]
    pub history_sync: bool,
    #[serde(default = "default_history_page_limit")]
    pub history_page_limit: u32,
    #[serde(default = "default_max_rate_limit_retries")]
    pub max_rate_limit_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,
    #[serde(default = "default_true")]
    pub run_on_startup: bool,
}

fn default_true() -> bool {
    true
}

fn default_library_base_url() -> String {
    "https://api.strem.io".to_string()
}

fn default_history_base_url() -> String {
    "https://api.trakt.tv".to_string()
}

fn default_metadata_base_url() -> String {
    "https://v3-cinemeta.strem.io".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_cache_ttl_secs() -> u64 {
    2 * 60 * 60
}

fn default_history_page_limit() -> u32 {
    100
}

fn default_max_rate_limit_retries() -> u32 {
    10
}

fn default_interval_minutes() -> u64 {
    30
}

pub fn default_scheduler_config() -> SchedulerConfig {
    SchedulerConfig {
        interval_minutes: default_interval_minutes(),
        run_on_startup: default_true(),
    }
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            base_url: default_library_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            base_url: default_metadata_base_url(),
            timeout_secs: default_timeout_secs(),
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            account_sync: true,
            history_sync: true,
            history_page_limit: default_history_page_limit(),
            max_rate_limit_retries: default_max_rate_limit_retries(),
        }
    }
}

impl LibraryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl HistoryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl MetadataConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

impl SchedulerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes * 60)
    }
}

impl Config {
    pub fn load_from_file(path: &PathBuf) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load the config file, falling back to defaults when it does not exist
    pub fn load_or_default(path: &PathBuf) -> anyhow::Result<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save_to_file(&self, path: &PathBuf) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, url) in [
            ("library.base_url", &self.library.base_url),
            ("metadata.base_url", &self.metadata.base_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(anyhow::anyhow!("{} must be an http(s) URL: {}", name, url));
            }
        }

        if self.sync.history_page_limit == 0 {
            return Err(anyhow::anyhow!("sync.history_page_limit must be greater than zero"));
        }

        if let Some(ref scheduler) = self.scheduler {
            if scheduler.interval_minutes == 0 {
                return Err(anyhow::anyhow!("scheduler.interval_minutes must be greater than zero"));
            }
        }

        if self.sync.history_sync {
            if let Some(ref history) = self.history {
                if history.enabled && (history.client_id.is_empty() || history.client_id == "YOUR_CLIENT_ID") {
                    return Err(anyhow::anyhow!("history service is enabled but client_id is not configured"));
                }
            }
        }

        Ok(())
    }

    pub fn is_history_configured(&self) -> bool {
        self.history
            .as_ref()
            .map(|h| h.enabled && !h.client_id.is_empty() && h.client_id != "YOUR_CLIENT_ID")
            .unwrap_or(false)
    }
}
