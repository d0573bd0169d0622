use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use watch_sync_models::{Meta, MetaKind};
use crate::error::SourceError;
use crate::http::{check_status, create_client};
use crate::traits::MetadataProvider;

pub const DEFAULT_BASE_URL: &str = "https://v3-cinemeta.strem.io";

#[derive(Debug, Deserialize)]
struct MetaResponse {
    meta: Option<Meta>,
}

/// Catalog addon serving `/meta/{type}/{id}.json`
#[derive(Clone)]
pub struct CinemetaClient {
    client: Arc<Client>,
    base_url: String,
}

impl CinemetaClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Arc::new(create_client(timeout)),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl MetadataProvider for CinemetaClient {
    async fn fetch_meta(&self, kind: MetaKind, content_id: &str) -> Result<Meta, SourceError> {
        let url = format!(
            "{}/meta/{}/{}.json",
            self.base_url,
            kind.as_str(),
            urlencoding::encode(content_id)
        );
        let response = self.client.get(&url).send().await?;
        let response = check_status(response, "fetch meta").await?;
        let body: MetaResponse = response.json().await?;
        body.meta
            .ok_or_else(|| SourceError::NotFound(format!("meta {}:{}", kind.as_str(), content_id)))
    }
}
