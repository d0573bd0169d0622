use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use watch_sync_models::{ItemTimestamp, LibraryItem};
use crate::error::SourceError;
use crate::http::{check_status, create_client};
use crate::traits::LibraryClient;

const COLLECTION: &str = "libraryItem";

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: i64,
}

/// Every datastore endpoint answers 200 with either `result` or `error`
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    result: Option<T>,
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Serialize)]
struct DatastoreGet<'a> {
    #[serde(rename = "authKey")]
    auth_key: &'a str,
    collection: &'a str,
    ids: &'a [String],
    all: bool,
}

#[derive(Debug, Serialize)]
struct DatastoreMeta<'a> {
    #[serde(rename = "authKey")]
    auth_key: &'a str,
    collection: &'a str,
}

#[derive(Debug, Serialize)]
struct DatastorePut<'a> {
    #[serde(rename = "authKey")]
    auth_key: &'a str,
    collection: &'a str,
    changes: &'a [LibraryItem],
}

#[derive(Debug, Deserialize)]
struct PutResult {
    #[serde(default)]
    success: bool,
}

/// `datastoreMeta` returns `[id, mtime_millis]` pairs
#[derive(Debug, Deserialize)]
struct MetaEntry(String, i64);

/// Library client for a single Stremio account
#[derive(Clone)]
pub struct StremioClient {
    client: Arc<Client>,
    base_url: String,
    auth_key: String,
}

impl StremioClient {
    pub fn new(base_url: impl Into<String>, auth_key: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Arc::new(create_client(timeout)),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_key: auth_key.into(),
        }
    }

    async fn call<B: Serialize, T: DeserializeOwned>(&self, method: &str, body: &B) -> Result<T, SourceError> {
        let url = format!("{}/api/{}", self.base_url, method);
        let response = self.client.post(&url).json(body).send().await?;
        let response = check_status(response, method).await?;
        let envelope: Envelope<T> = response.json().await?;

        if let Some(err) = envelope.error {
            // code 1: session does not exist
            if err.code == 1 {
                return Err(SourceError::Unauthorized(err.message));
            }
            return Err(SourceError::Api {
                status: 200,
                message: format!("{}: {} (code {})", method, err.message, err.code),
            });
        }

        envelope
            .result
            .ok_or_else(|| SourceError::new(format!("{}: response has neither result nor error", method)))
    }
}

#[async_trait]
impl LibraryClient for StremioClient {
    async fn list_items(&self, ids: &[String]) -> Result<Vec<LibraryItem>, SourceError> {
        let items: Vec<LibraryItem> = self
            .call(
                "datastoreGet",
                &DatastoreGet {
                    auth_key: &self.auth_key,
                    collection: COLLECTION,
                    ids,
                    all: ids.is_empty(),
                },
            )
            .await?;
        debug!(requested = ids.len(), received = items.len(), "Fetched library items");
        Ok(items)
    }

    async fn list_modified_since(&self, watermark: DateTime<Utc>) -> Result<Vec<ItemTimestamp>, SourceError> {
        let entries: Vec<MetaEntry> = self
            .call(
                "datastoreMeta",
                &DatastoreMeta {
                    auth_key: &self.auth_key,
                    collection: COLLECTION,
                },
            )
            .await?;

        let modified = entries
            .into_iter()
            .filter_map(|MetaEntry(id, millis)| {
                let modified_at = Utc.timestamp_millis_opt(millis).single()?;
                (modified_at > watermark).then_some(ItemTimestamp { id, modified_at })
            })
            .collect::<Vec<_>>();
        debug!(modified = modified.len(), %watermark, "Fetched library item timestamps");
        Ok(modified)
    }

    async fn update_items(&self, items: &[LibraryItem]) -> Result<(), SourceError> {
        if items.is_empty() {
            return Ok(());
        }
        let result: PutResult = self
            .call(
                "datastorePut",
                &DatastorePut {
                    auth_key: &self.auth_key,
                    collection: COLLECTION,
                    changes: items,
                },
            )
            .await?;
        if !result.success {
            return Err(SourceError::new("datastorePut reported failure"));
        }
        Ok(())
    }
}
