use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use url::Url;

use kbsync_core::{DocumentId, SyncConfig};

use crate::{ClientError, KnowledgeApi, RemoteDocument, RetryPolicy};

pub const DOCUMENTS_PATH: &str = "/api/v1/knowledge/documents";

/// HTTP client for the knowledge-base document API.
///
/// Every call carries `Authorization: Bearer <key>` and is retried per the
/// configured [`RetryPolicy`]. Uploads without an explicit collection go to
/// `default_collection`, when one is configured.
#[derive(Clone)]
pub struct KnowledgeClient {
    http: Client,
    base_url: Url,
    token: String,
    default_collection: Option<String>,
    retry: RetryPolicy,
}

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    title: &'a str,
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    collection: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct UpsertResponse {
    #[serde(default)]
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ListResponse {
    Wrapped { items: Vec<RemoteDocument> },
    Bare(Vec<RemoteDocument>),
}

impl KnowledgeClient {
    pub fn new(base_url: &str, token: impl Into<String>) -> Result<Self, ClientError> {
        Self::with_options(
            base_url,
            token,
            None,
            RetryPolicy::default(),
            kbsync_core::config::DEFAULT_TIMEOUT,
        )
    }

    pub fn with_options(
        base_url: &str,
        token: impl Into<String>,
        default_collection: Option<String>,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: Url::parse(base_url.trim_end_matches('/'))?,
            token: token.into(),
            default_collection,
            retry,
        })
    }

    /// Build a client from a loaded configuration. The API key must be set.
    pub fn from_config(config: &SyncConfig, token: &str) -> Result<Self, ClientError> {
        Self::with_options(
            &config.base_url,
            token,
            config.collection.clone(),
            RetryPolicy::from_config(config),
            config.request_timeout,
        )
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn upsert_once(
        &self,
        title: &str,
        content: &str,
        collection: Option<&str>,
    ) -> Result<DocumentId, ClientError> {
        let url = self.endpoint(DOCUMENTS_PATH)?;
        let response = self
            .http
            .put(url)
            .header("Authorization", self.auth_header_value())
            .json(&UpsertRequest {
                title,
                content,
                collection: collection.or(self.default_collection.as_deref()),
            })
            .send()
            .await?;
        let body: UpsertResponse = Self::handle_response(response).await?;
        body.id
            .filter(|id| !id.is_empty())
            .map(DocumentId::from)
            .ok_or(ClientError::MissingId)
    }

    async fn delete_once(&self, id: &DocumentId) -> Result<(), ClientError> {
        let mut url = self.endpoint(DOCUMENTS_PATH)?;
        url.path_segments_mut()
            .map_err(|()| ClientError::Url(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .push(&id.0);
        let response = self
            .http
            .delete(url)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(ClientError::Api { status, body })
    }

    async fn list_once(&self) -> Result<Vec<RemoteDocument>, ClientError> {
        let url = self.endpoint(DOCUMENTS_PATH)?;
        let response = self
            .http
            .get(url)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        let payload: ListResponse = Self::handle_response(response).await?;
        Ok(match payload {
            ListResponse::Wrapped { items } => items,
            ListResponse::Bare(items) => items,
        })
    }

    fn auth_header_value(&self) -> String {
        format!("Bearer {}", self.token)
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}{path}"))?)
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        if response.status().is_success() {
            Ok(response.json::<T>().await?)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ClientError::Api { status, body })
        }
    }
}

#[async_trait]
impl KnowledgeApi for KnowledgeClient {
    async fn upsert_document(
        &self,
        title: &str,
        content: &str,
        collection: Option<&str>,
    ) -> Result<DocumentId, ClientError> {
        self.retry
            .run("upsert_document", || {
                self.upsert_once(title, content, collection)
            })
            .await
    }

    async fn delete_document(&self, id: &DocumentId) -> Result<(), ClientError> {
        self.retry
            .run("delete_document", || self.delete_once(id))
            .await
    }

    async fn list_documents(&self) -> Result<Vec<RemoteDocument>, ClientError> {
        self.retry.run("list_documents", || self.list_once()).await
    }
}
