//! Client for the metadata API.
//!
//! Every request is a `POST` of a JSON array holding one command, to
//! `<api_url>?id=<unix millis>` (plus `&n=<folder id>` for anything inside a
//! shared folder). The response is an array with one result per command, or
//! a bare negative integer on failure.

use serde::Deserialize;
use serde_json::{Value, json};

use crate::config::DownloadConfig;
use crate::error::{Error, Result};
use crate::task::RetryPolicy;
use crate::tree::Node;

/// Where and how big a file is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Short-lived direct media URL.
    pub url: String,
    /// Declared size in bytes.
    pub size: u64,
    /// Encrypted attribute blob, if the service returned one.
    pub attributes: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawFileInfo {
    g: Option<String>,
    s: Option<u64>,
    at: Option<String>,
}

impl TryFrom<RawFileInfo> for FileInfo {
    type Error = Error;

    fn try_from(raw: RawFileInfo) -> Result<Self> {
        match (raw.g, raw.s) {
            (Some(url), Some(size)) if !url.is_empty() => Ok(Self {
                url,
                size,
                attributes: raw.at,
            }),
            _ => Err(Error::Validation(
                "file metadata is missing the download URL or size".into(),
            )),
        }
    }
}

/// Metadata API client.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    api_url: String,
    retry: RetryPolicy,
}

impl ApiClient {
    /// Builds a client from the download configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the HTTP client cannot be constructed.
    pub fn new(config: &DownloadConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .read_timeout(config.read_timeout())
            .build()?;
        Ok(Self::with_client(http, config))
    }

    /// Uses an existing HTTP client.
    #[must_use]
    pub fn with_client(http: reqwest::Client, config: &DownloadConfig) -> Self {
        Self {
            http,
            api_url: config.api_url.clone(),
            retry: RetryPolicy::new(config.api_retries, config.retry_backoff()),
        }
    }

    /// Resolves a public file id to its media URL and size.
    ///
    /// # Errors
    ///
    /// Returns a network or API error if the request fails, and
    /// [`Error::Validation`] if the answer lacks a URL or size.
    pub async fn file_info(&self, id: &str) -> Result<FileInfo> {
        let value = self.call(json!({"a": "g", "g": 1, "p": id}), None).await?;
        parse_file_info(value)
    }

    /// Resolves a file inside a shared folder.
    ///
    /// # Errors
    ///
    /// Same as [`ApiClient::file_info`].
    pub async fn folder_file_info(&self, folder_id: &str, node_id: &str) -> Result<FileInfo> {
        let value = self
            .call(json!({"a": "g", "g": 1, "n": node_id}), Some(folder_id))
            .await?;
        parse_file_info(value)
    }

    /// Lists every node under a shared folder.
    ///
    /// Entries that do not look like nodes are dropped.
    ///
    /// # Errors
    ///
    /// Returns a network or API error if the request fails, and
    /// [`Error::Validation`] if the answer has no node array.
    pub async fn list_folder(&self, folder_id: &str) -> Result<Vec<Node>> {
        let value = self
            .call(json!({"a": "f", "c": 1, "r": 1, "ca": 1}), Some(folder_id))
            .await?;
        let Some(Value::Array(entries)) = value.get("f").cloned() else {
            return Err(Error::Validation(format!(
                "folder listing for {folder_id} has no node array"
            )));
        };
        let total = entries.len();
        let nodes: Vec<Node> = entries
            .into_iter()
            .filter_map(|entry| serde_json::from_value(entry).ok())
            .collect();
        if nodes.len() < total {
            log::debug!("dropped {} malformed listing entries", total - nodes.len());
        }
        log::debug!("folder {folder_id}: {} nodes", nodes.len());
        Ok(nodes)
    }

    /// Sends one command, retrying while the service says "try again".
    async fn call(&self, command: Value, folder: Option<&str>) -> Result<Value> {
        self.retry
            .run_if(|| self.call_once(&command, folder), Error::is_try_again)
            .await
    }

    async fn call_once(&self, command: &Value, folder: Option<&str>) -> Result<Value> {
        let mut query = vec![("id", chrono::Utc::now().timestamp_millis().to_string())];
        if let Some(folder) = folder {
            query.push(("n", folder.to_string()));
        }

        let response = self
            .http
            .post(&self.api_url)
            .query(&query)
            .json(&[command])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Network(format!("metadata API returned HTTP {status}")));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::Network(format!("unreadable metadata API response: {e}")))?;
        first_result(body)
    }
}

/// Unwraps the per-command result, turning negative codes into errors.
fn first_result(body: Value) -> Result<Value> {
    let result = match body {
        Value::Array(mut items) if !items.is_empty() => items.swap_remove(0),
        Value::Array(_) => {
            return Err(Error::Network("empty metadata API response".into()));
        }
        other => other,
    };
    match result.as_i64() {
        Some(code) if code < 0 => Err(Error::Api { code }),
        _ => Ok(result),
    }
}

fn parse_file_info(value: Value) -> Result<FileInfo> {
    let raw: RawFileInfo = serde_json::from_value(value)
        .map_err(|e| Error::Validation(format!("unexpected file metadata: {e}")))?;
    raw.try_into()
}
