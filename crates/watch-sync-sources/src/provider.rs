use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::debug;
use watch_sync_config::{Config, CredentialStore};
use crate::error::SourceError;
use crate::stremio::StremioClient;
use crate::traits::{ClientProvider, HistoryClient, LibraryClient};
use crate::trakt::TraktClient;

/// Builds authenticated clients from tokens in the credential store
pub struct CredentialClientProvider {
    config: Config,
    credentials: CredentialStore,
}

impl CredentialClientProvider {
    pub fn new(config: Config, credentials: CredentialStore) -> Self {
        Self {
            config,
            credentials,
        }
    }

    fn token_for(&self, account_id: &str) -> Result<String, SourceError> {
        let credentials = &self.credentials;
        if credentials.get_account_token(account_id).is_none() {
            return Err(SourceError::Unauthorized(format!("no credentials for account {}", account_id)));
        }
        credentials
            .valid_account_token(account_id, Utc::now())
            .cloned()
            .ok_or_else(|| SourceError::Unauthorized(format!("token for account {} has expired", account_id)))
    }
}

#[async_trait]
impl ClientProvider for CredentialClientProvider {
    async fn library_client(&self, account_id: &str) -> Result<Arc<dyn LibraryClient>, SourceError> {
        let token = self.token_for(account_id)?;
        debug!(account_id, "Created library client");
        Ok(Arc::new(StremioClient::new(
            self.config.library.base_url.clone(),
            token,
            self.config.library.timeout(),
        )))
    }

    async fn history_client(&self, account_id: &str) -> Result<Arc<dyn HistoryClient>, SourceError> {
        let history = self
            .config
            .history
            .as_ref()
            .filter(|_| self.config.is_history_configured())
            .ok_or_else(|| SourceError::new("history service is not configured"))?;
        let token = self.token_for(account_id)?;
        debug!(account_id, "Created history client");
        Ok(Arc::new(TraktClient::new(
            history.base_url.clone(),
            history.client_id.clone(),
            token,
            history.timeout(),
        )))
    }
}
