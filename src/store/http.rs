use std::time::Duration;

use async_trait::async_trait;
use log::{debug, trace};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;

use super::RemoteStore;
use crate::config::StoreConfig;
use crate::error::RosterSyncError;
use crate::model::{Caller, Fields, StoredRecord};

const API_KEY_HEADER: &str = "api_key";

/// REST client for the backend-as-a-service entity API
pub struct HttpStore {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

/// List endpoints answer either with a bare array or wrapped in an object
#[derive(Deserialize)]
#[serde(untagged)]
enum ListBody {
    Plain(Vec<StoredRecord>),
    Wrapped { items: Vec<StoredRecord> },
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(alias = "error", alias = "detail")]
    message: String,
}

impl HttpStore {
    pub fn new(config: &StoreConfig) -> Result<Self, RosterSyncError> {
        let base_url = config.base_url.trim().trim_end_matches('/').to_owned();
        if base_url.is_empty() {
            return Err(RosterSyncError::Error(
                "store.base_url is not configured".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(HttpStore {
            client,
            base_url,
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
        })
    }

    fn entity_url(&self, collection: &str) -> String {
        format!("{}/entities/{}", self.base_url, collection)
    }

    fn with_key(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header(API_KEY_HEADER, key),
            None => builder,
        }
    }

    /// Turn any non-success answer into a transport error carrying the
    /// backend's message when it sent one
    async fn check(response: Response) -> Result<Response, RosterSyncError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|b| b.message)
            .unwrap_or_else(|_| {
                if body.is_empty() {
                    status.canonical_reason().unwrap_or("request failed").to_string()
                } else {
                    body
                }
            });

        Err(RosterSyncError::transport(status.as_u16(), message))
    }
}

#[async_trait]
impl RemoteStore for HttpStore {
    async fn list(
        &self,
        collection: &str,
        sort_key: Option<&str>,
        limit: usize,
        skip: usize,
    ) -> Result<Vec<StoredRecord>, RosterSyncError> {
        let mut query: Vec<(&str, String)> =
            vec![("limit", limit.to_string()), ("skip", skip.to_string())];
        if let Some(sort) = sort_key {
            query.push(("sort", sort.to_string()));
        }

        trace!("GET {} limit={} skip={}", collection, limit, skip);
        let request = self.with_key(self.client.get(self.entity_url(collection)).query(&query));
        let response = Self::check(request.send().await?).await?;

        let records = match response.json::<ListBody>().await? {
            ListBody::Plain(records) => records,
            ListBody::Wrapped { items } => items,
        };
        Ok(records)
    }

    async fn create(
        &self,
        collection: &str,
        fields: &Fields,
    ) -> Result<StoredRecord, RosterSyncError> {
        debug!("POST {}", collection);
        let request = self.with_key(self.client.post(self.entity_url(collection)).json(fields));
        let response = Self::check(request.send().await?).await?;
        Ok(response.json::<StoredRecord>().await?)
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        fields: &Fields,
    ) -> Result<StoredRecord, RosterSyncError> {
        debug!("PUT {}/{}", collection, id);
        let url = format!("{}/{}", self.entity_url(collection), id);
        let request = self.with_key(self.client.put(url).json(fields));
        let response = Self::check(request.send().await?).await?;
        Ok(response.json::<StoredRecord>().await?)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), RosterSyncError> {
        debug!("DELETE {}/{}", collection, id);
        let url = format!("{}/{}", self.entity_url(collection), id);
        let request = self.with_key(self.client.delete(url));
        Self::check(request.send().await?).await?;
        Ok(())
    }

    async fn current_user(&self, token: &str) -> Result<Caller, RosterSyncError> {
        let url = format!("{}/auth/me", self.base_url);
        let request = self.with_key(self.client.get(url).bearer_auth(token));
        let response = Self::check(request.send().await?).await?;
        Ok(response.json::<Caller>().await?)
    }
}
