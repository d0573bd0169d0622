use anyhow::{anyhow, Result};
use std::path::PathBuf;

/// Base directory inside the container image, overridable with `WATCHSYNC_BASE_PATH`
pub fn container_base_path() -> PathBuf {
    std::env::var("WATCHSYNC_BASE_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/app"))
}

/// On-disk layout:
///
/// ```text
/// <base>/config.toml
/// <base>/credentials.toml
/// <base>/data/links/account_account.json
/// <base>/data/links/account_history.json
/// <base>/data/cache/id/id_maps.bin
/// <base>/logs/watchsync.log
/// ```
pub struct PathManager {
    base: PathBuf,
}

impl PathManager {
    /// `<user config dir>/watchsync`
    pub fn new() -> Result<Self> {
        let config_dir = dirs::config_dir().ok_or_else(|| anyhow!("Could not determine config directory"))?;
        Ok(Self::with_base(config_dir.join("watchsync")))
    }

    pub fn with_base(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn config_file(&self) -> PathBuf {
        self.base.join("config.toml")
    }

    pub fn credentials_file(&self) -> PathBuf {
        self.base.join("credentials.toml")
    }

    pub fn links_dir(&self) -> PathBuf {
        self.base.join("data").join("links")
    }

    pub fn account_links_file(&self) -> PathBuf {
        self.links_dir().join("account_account.json")
    }

    pub fn history_links_file(&self) -> PathBuf {
        self.links_dir().join("account_history.json")
    }

    pub fn cache_id_dir(&self) -> PathBuf {
        self.base.join("data").join("cache").join("id")
    }

    pub fn daemon_log_file(&self) -> PathBuf {
        self.base.join("logs").join("watchsync.log")
    }

    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [self.base.clone(), self.links_dir(), self.cache_id_dir(), self.base.join("logs")] {
            std::fs::create_dir_all(&dir)?;
        }
        Ok(())
    }
}

impl Default for PathManager {
    /// The container base when the image created it, the user config dir otherwise
    fn default() -> Self {
        let container_base = container_base_path();
        if container_base.exists() {
            return Self::with_base(container_base);
        }
        Self::new().unwrap_or_else(|_| Self::with_base(container_base))
    }
}
