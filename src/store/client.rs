// ABOUTME: HTTP client for the CouchDB-compatible document store
// ABOUTME: Implements database creation, document reads/writes and info lookups

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use std::time::Duration;
use url::Url;

use super::models::{DatabaseInfo, ErrorBody};
use super::{redact, StoreError, StoreResult};

/// Outcome of a create-database call that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateDatabase {
    Created,
    AlreadyExists,
}

/// Operations the orchestrator needs from the document store.
///
/// Every address is a fully-qualified URL which may embed credentials.
#[async_trait]
pub trait StoreClient: Send + Sync {
    async fn create_database(&self, db_url: &Url) -> StoreResult<CreateDatabase>;

    async fn get_database_info(&self, db_url: &Url) -> StoreResult<DatabaseInfo>;

    /// Lists every database on the cluster that `cluster_url` points at.
    async fn list_databases(&self, cluster_url: &Url) -> StoreResult<Vec<String>>;

    async fn insert_document(&self, db_url: &Url, doc: &Value) -> StoreResult<()>;

    /// Returns `None` when the document does not exist.
    async fn get_document(&self, db_url: &Url, id: &str) -> StoreResult<Option<Value>>;

    async fn update_document(&self, db_url: &Url, id: &str, doc: &Value) -> StoreResult<()>;
}

pub struct HttpStoreClient {
    client: Client,
}

impl HttpStoreClient {
    pub fn new() -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }

    fn request(&self, method: Method, url: &Url) -> RequestBuilder {
        let (bare, credentials) = split_credentials(url);
        let builder = self.client.request(method, bare);
        match credentials {
            Some((user, password)) => builder.basic_auth(user, password),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder, url: &Url) -> StoreResult<Response> {
        builder.send().await.map_err(|source| StoreError::Transport {
            url: redact(url),
            source,
        })
    }

    async fn json<T: serde::de::DeserializeOwned>(response: Response, url: &Url) -> StoreResult<T> {
        response.json().await.map_err(|e| StoreError::Decode {
            url: redact(url),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl StoreClient for HttpStoreClient {
    async fn create_database(&self, db_url: &Url) -> StoreResult<CreateDatabase> {
        let response = self.send(self.request(Method::PUT, db_url), db_url).await?;

        if response.status() == StatusCode::PRECONDITION_FAILED {
            return Ok(CreateDatabase::AlreadyExists);
        }
        check_status(response, db_url).await?;
        Ok(CreateDatabase::Created)
    }

    async fn get_database_info(&self, db_url: &Url) -> StoreResult<DatabaseInfo> {
        let response = self.send(self.request(Method::GET, db_url), db_url).await?;
        let response = check_status(response, db_url).await?;
        Self::json(response, db_url).await
    }

    async fn list_databases(&self, cluster_url: &Url) -> StoreResult<Vec<String>> {
        let url = child_url(&cluster_root(cluster_url), "_all_dbs")?;
        let response = self.send(self.request(Method::GET, &url), &url).await?;
        let response = check_status(response, &url).await?;
        Self::json(response, &url).await
    }

    async fn insert_document(&self, db_url: &Url, doc: &Value) -> StoreResult<()> {
        let response = self
            .send(self.request(Method::POST, db_url).json(doc), db_url)
            .await?;
        check_status(response, db_url).await?;
        Ok(())
    }

    async fn get_document(&self, db_url: &Url, id: &str) -> StoreResult<Option<Value>> {
        let url = child_url(db_url, id)?;
        let response = self.send(self.request(Method::GET, &url), &url).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = check_status(response, &url).await?;
        Self::json(response, &url).await.map(Some)
    }

    async fn update_document(&self, db_url: &Url, id: &str, doc: &Value) -> StoreResult<()> {
        let url = child_url(db_url, id)?;
        let response = self
            .send(self.request(Method::PUT, &url).json(doc), &url)
            .await?;
        check_status(response, &url).await?;
        Ok(())
    }
}

async fn check_status(response: Response, url: &Url) -> StoreResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let (error, reason) = match serde_json::from_str::<ErrorBody>(&body) {
        Ok(parsed) => (parsed.error, parsed.reason),
        Err(_) if body.is_empty() => (status.to_string(), None),
        Err(_) => (status.to_string(), Some(body)),
    };
    Err(StoreError::Http {
        url: redact(url),
        status: status.as_u16(),
        error,
        reason,
    })
}

/// Removes userinfo from `url`, returning it decoded alongside the bare URL.
pub(crate) fn split_credentials(url: &Url) -> (Url, Option<(String, Option<String>)>) {
    if url.username().is_empty() && url.password().is_none() {
        return (url.clone(), None);
    }

    let user = decode(url.username());
    let password = url.password().map(decode);
    let mut bare = url.clone();
    let _ = bare.set_username("");
    let _ = bare.set_password(None);
    (bare, Some((user, password)))
}

/// The URL of the cluster itself, with path, query and fragment removed.
pub fn cluster_root(url: &Url) -> Url {
    let mut root = url.clone();
    root.set_path("/");
    root.set_query(None);
    root.set_fragment(None);
    root
}

/// Appends one percent-encoded path segment to `base`, tolerating a trailing slash.
pub fn child_url(base: &Url, segment: &str) -> StoreResult<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| StoreError::InvalidUrl {
            url: redact(base),
            message: "URL cannot carry a path".to_string(),
        })?
        .pop_if_empty()
        .push(segment);
    Ok(url)
}

fn decode(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}
