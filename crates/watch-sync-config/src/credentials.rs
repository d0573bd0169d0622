use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct AccountCredential {
    token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CredentialsFile {
    #[serde(default)]
    accounts: BTreeMap<String, AccountCredential>,
}

/// Per-account tokens, stored in `credentials.toml` as one table per account:
///
/// ```toml
/// [accounts.stremio-main]
/// token = "..."
/// expires_at = "2026-01-01T00:00:00Z"
/// ```
pub struct CredentialStore {
    path: PathBuf,
    accounts: BTreeMap<String, AccountCredential>,
}

impl CredentialStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            accounts: BTreeMap::new(),
        }
    }

    /// A missing file leaves the store empty
    pub fn load(&mut self) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        let file: CredentialsFile = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", self.path.display()))?;
        self.accounts = file.accounts;
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = CredentialsFile {
            accounts: self.accounts.clone(),
        };
        std::fs::write(&self.path, toml::to_string_pretty(&file)?)?;
        Ok(())
    }

    pub fn get_account_token(&self, account_id: &str) -> Option<&String> {
        self.accounts.get(account_id).map(|c| &c.token)
    }

    /// Replaces any previous token along with its expiry
    pub fn set_account_token(&mut self, account_id: &str, token: String) {
        self.accounts.insert(
            account_id.to_string(),
            AccountCredential {
                token,
                expires_at: None,
            },
        );
    }

    pub fn get_account_token_expires(&self, account_id: &str) -> Option<DateTime<Utc>> {
        self.accounts.get(account_id).and_then(|c| c.expires_at)
    }

    /// No-op for an account without a token
    pub fn set_account_token_expires(&mut self, account_id: &str, expires: DateTime<Utc>) {
        if let Some(credential) = self.accounts.get_mut(account_id) {
            credential.expires_at = Some(expires);
        }
    }

    /// Token for `account_id` when present and not expired at `now`
    pub fn valid_account_token(&self, account_id: &str, now: DateTime<Utc>) -> Option<&String> {
        let credential = self.accounts.get(account_id)?;
        match credential.expires_at {
            Some(expires_at) if expires_at <= now => None,
            _ => Some(&credential.token),
        }
    }

    pub fn remove_account(&mut self, account_id: &str) {
        self.accounts.remove(account_id);
    }
}
