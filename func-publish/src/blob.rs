//! Blob storage client implementing [`BlobStore`] over the Blob service REST API.
//!
//! Requests are authorised with a short-lived account SAS issued per call, so the
//! client itself holds no credentials. No request timeout is set.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use func_publish_core::contract::{BlobStore, StorageError};
use func_publish_core::sas::{StorageAccount, SAS_VERSION};
use reqwest::{Client, StatusCode, Url};

/// Lifetime of the write token used for upload requests.
const WRITE_TOKEN_MINUTES: i64 = 60;

#[derive(Default)]
pub struct AzureBlobStore {
    http: Client,
}

impl AzureBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn authorised(account: &StorageAccount, mut url: Url, extra: &[(&str, &str)]) -> Url {
    let now = Utc::now();
    let token = account.write_token(
        now - Duration::minutes(5),
        now + Duration::minutes(WRITE_TOKEN_MINUTES),
    );
    if !extra.is_empty() {
        url.query_pairs_mut().extend_pairs(extra);
    }
    let query = match url.query() {
        Some(existing) if !existing.is_empty() => format!("{existing}&{token}"),
        _ => token,
    };
    url.set_query(Some(&query));
    url
}

fn transport(e: reqwest::Error) -> StorageError {
    tracing::error!(error = ?e, "Blob request failed");
    StorageError::Transport(e.to_string())
}

async fn rejected(response: reqwest::Response) -> StorageError {
    let status = response.status().as_u16();
    let detail = response.text().await.unwrap_or_default();
    tracing::error!(status, detail = %detail, "Blob service rejected request");
    StorageError::Rejected { status, detail }
}

#[async_trait]
impl BlobStore for AzureBlobStore {
    async fn ensure_container(
        &self,
        account: &StorageAccount,
        container: &str,
    ) -> Result<(), StorageError> {
        let url = authorised(
            account,
            account.resource_url(container, None)?,
            &[("restype", "container")],
        );
        let response = self
            .http
            .put(url)
            .header("x-ms-version", SAS_VERSION)
            .send()
            .await
            .map_err(transport)?;
        match response.status() {
            StatusCode::CREATED => {
                tracing::info!(container, "Created container");
                Ok(())
            }
            StatusCode::CONFLICT => {
                tracing::debug!(container, "Container already exists");
                Ok(())
            }
            _ => Err(rejected(response).await),
        }
    }

    async fn put_blob(
        &self,
        account: &StorageAccount,
        container: &str,
        blob_name: &str,
        content: Vec<u8>,
    ) -> Result<Url, StorageError> {
        let blob_url = account.resource_url(container, Some(blob_name))?;
        let size = content.len();
        let response = self
            .http
            .put(authorised(account, blob_url.clone(), &[]))
            .header("x-ms-blob-type", "BlockBlob")
            .header("x-ms-version", SAS_VERSION)
            .header(reqwest::header::CONTENT_TYPE, "application/zip")
            .body(content)
            .send()
            .await
            .map_err(transport)?;
        if response.status() != StatusCode::CREATED {
            return Err(rejected(response).await);
        }
        tracing::info!(blob = blob_name, bytes = size, "Uploaded blob");
        Ok(blob_url)
    }
}
