use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use watch_sync_models::{HistoryBatch, HistoryPage, HistoryQuery, IdType, ItemKind};
use crate::error::SourceError;
use crate::http::{check_status, create_client};
use crate::traits::HistoryClient;
use crate::trakt::api::{self, AddHistoryRequest, AddHistoryResponse, LookupResult, TraktHistoryItem};

/// History-service client bound to one account's access token
#[derive(Clone)]
pub struct TraktClient {
    client: Arc<Client>,
    base_url: String,
    client_id: String,
    access_token: String,
}

impl TraktClient {
    pub fn new(
        base_url: impl Into<String>,
        client_id: impl Into<String>,
        access_token: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client: Arc::new(create_client(timeout)),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client_id: client_id.into(),
            access_token: access_token.into(),
        }
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("Authorization", format!("Bearer {}", self.access_token))
            .header("trakt-api-version", "2")
            .header("trakt-api-key", &self.client_id)
            .header("Accept", "application/json")
    }

    fn history_path(query: &HistoryQuery) -> String {
        let mut path = String::from("/sync/history");
        if let Some(item_type) = query.item_type {
            path.push('/');
            path.push_str(item_type.as_str());
            if let Some(id) = query.id {
                path.push_str(&format!("/{}", id));
            }
        }
        path
    }
}

#[async_trait]
impl HistoryClient for TraktClient {
    async fn get_history(&self, query: &HistoryQuery) -> Result<HistoryPage, SourceError> {
        let url = format!("{}{}", self.base_url, Self::history_path(query));

        let mut params: Vec<(&str, String)> = Vec::new();
        if query.page > 0 {
            params.push(("page", query.page.to_string()));
        }
        if query.limit > 0 {
            params.push(("limit", query.limit.to_string()));
        }
        if let Some(start_at) = query.start_at {
            params.push(("start_at", start_at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)));
        }

        let response = self.authorized(self.client.get(&url)).query(&params).send().await?;
        let response = check_status(response, "get history").await?;
        let items: Vec<TraktHistoryItem> = response.json().await?;
        debug!(page = query.page, items = items.len(), "Fetched history page");
        Ok(api::into_page(items))
    }

    async fn add_history(&self, batch: &HistoryBatch) -> Result<(), SourceError> {
        if batch.is_empty() {
            return Ok(());
        }
        let url = format!("{}/sync/history", self.base_url);
        let body = AddHistoryRequest::from(batch);
        let response = self.authorized(self.client.post(&url)).json(&body).send().await?;
        let response = check_status(response, "add history").await?;
        let result: AddHistoryResponse = response.json().await?;
        info!(
            movies = result.added.movies,
            episodes = result.added.episodes,
            "Added items to history"
        );
        Ok(())
    }

    async fn lookup_id(&self, id_type: IdType, id: &str, kind: ItemKind) -> Result<Option<u64>, SourceError> {
        let url = format!(
            "{}/search/{}/{}",
            self.base_url,
            id_type.as_str(),
            urlencoding::encode(id)
        );
        let response = self
            .authorized(self.client.get(&url))
            .query(&[("type", kind.as_str())])
            .send()
            .await?;
        let response = match check_status(response, "lookup id").await {
            Ok(response) => response,
            Err(SourceError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        let results: Vec<LookupResult> = response.json().await?;
        Ok(results.iter().find_map(LookupResult::trakt_id))
    }
}
