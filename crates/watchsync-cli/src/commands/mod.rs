pub mod config;
pub mod daemon;
pub mod links;
pub mod sync;

use color_eyre::eyre::eyre;
use color_eyre::Result;
use std::sync::Arc;
use tracing::debug;
use watch_sync_config::{Config, CredentialStore, PathManager};
use watch_sync_core::{AccountSyncEngine, EngineSettings, FileIdMapStore, HistorySyncEngine, JsonLinkStore, MetaCache};
use watch_sync_sources::{CinemetaClient, CredentialClientProvider};

/// Which engines a command should run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSelection {
    pub account: bool,
    pub history: bool,
}

impl EngineSelection {
    /// Explicit flags win, otherwise the configured defaults apply
    pub fn resolve(account_flag: bool, history_flag: bool, config: &Config) -> Self {
        if account_flag || history_flag {
            Self {
                account: account_flag,
                history: history_flag,
            }
        } else {
            Self {
                account: config.sync.account_sync,
                history: config.sync.history_sync,
            }
        }
    }
}

pub fn load_config(paths: &PathManager) -> Result<Config> {
    let config_file = paths.config_file();
    let config = Config::load_or_default(&config_file)
        .map_err(|e| eyre!("Failed to load config from {}: {}", config_file.display(), e))?;
    config
        .validate()
        .map_err(|e| eyre!("Invalid configuration in {}: {}", config_file.display(), e))?;
    Ok(config)
}

/// Engines wired against the on-disk stores and the configured services
pub struct Engines {
    pub account: Option<Arc<AccountSyncEngine>>,
    pub history: Option<Arc<HistorySyncEngine>>,
}

impl Engines {
    pub fn build(paths: &PathManager, config: &Config, selection: EngineSelection) -> Result<Self> {
        paths
            .ensure_directories()
            .map_err(|e| eyre!("Failed to create data directories: {}", e))?;

        let credentials_file = paths.credentials_file();
        let mut credentials = CredentialStore::new(credentials_file.clone());
        credentials
            .load()
            .map_err(|e| eyre!("Failed to load credentials from {}: {}", credentials_file.display(), e))?;

        let clients = Arc::new(CredentialClientProvider::new(config.clone(), credentials));
        let provider = Arc::new(CinemetaClient::new(
            config.metadata.base_url.clone(),
            config.metadata.timeout(),
        ));
        let meta = Arc::new(MetaCache::new(provider, config.metadata.cache_ttl()));
        let settings = EngineSettings::from(&config.sync);

        let account = selection.account.then(|| {
            Arc::new(AccountSyncEngine::new(
                Arc::new(JsonLinkStore::account_links(paths)),
                clients.clone(),
                meta.clone(),
                settings,
            ))
        });

        let history = if selection.history {
            let id_maps = FileIdMapStore::open(&paths.cache_id_dir())
                .map_err(|e| eyre!("Failed to open id map store: {}", e))?;
            Some(Arc::new(HistorySyncEngine::new(
                Arc::new(JsonLinkStore::history_links(paths)),
                clients,
                Arc::new(id_maps),
                meta,
                settings,
            )))
        } else {
            None
        };

        debug!(
            account = account.is_some(),
            history = history.is_some(),
            "Engines initialized"
        );
        Ok(Self { account, history })
    }

    pub fn is_empty(&self) -> bool {
        self.account.is_none() && self.history.is_none()
    }
}
