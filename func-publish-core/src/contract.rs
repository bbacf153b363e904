#![allow(unused)]

//! # contract: interfaces to the remote systems a publish talks to
//!
//! The pipeline needs two external collaborators:
//! - [`RemoteSettings`]: reads and replaces the Function App's app settings.
//! - [`BlobStore`]: creates the release container and stores package blobs.
//!
//! Both are async traits so the CLI can back them with HTTP clients while tests
//! use the `mockall` mocks generated here (exported under the default
//! `test-export-mocks` feature).
//!
//! ## Errors
//! Implementations convert transport and service failures into
//! [`RemoteSettingsError`] / [`StorageError`], keeping the remote-provided
//! detail so it can be shown to the user verbatim.

use async_trait::async_trait;
use reqwest::Url;
use thiserror::Error;

use mockall::{automock, predicate::*};

use crate::sas::StorageAccount;
use crate::settings::SettingsMap;

/// Failure talking to the settings store.
#[derive(Debug, Error)]
pub enum RemoteSettingsError {
    #[error("request to settings store failed: {0}")]
    Transport(String),

    #[error("settings store rejected the request ({status}): {detail}")]
    Rejected { status: u16, detail: String },

    #[error("unexpected settings payload: {0}")]
    Decode(String),
}

/// Failure talking to blob storage.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("request to blob storage failed: {0}")]
    Transport(String),

    #[error("blob storage rejected the request ({status}): {detail}")]
    Rejected { status: u16, detail: String },

    #[error(transparent)]
    Sas(#[from] crate::sas::SasError),
}

/// The Function App's app settings, as stored remotely.
///
/// The implementor knows which app it targets and how to authenticate.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait RemoteSettings: Send + Sync {
    /// Fetch the current settings.
    async fn fetch_settings(&self) -> Result<SettingsMap, RemoteSettingsError>;

    /// Replace the remote settings with `settings`.
    async fn update_settings(&self, settings: &SettingsMap) -> Result<(), RemoteSettingsError>;
}

/// Object storage holding release packages.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Create `container` unless it already exists.
    async fn ensure_container(
        &self,
        account: &StorageAccount,
        container: &str,
    ) -> Result<(), StorageError>;

    /// Store `content` as a block blob and return the blob's URI (without token).
    async fn put_blob(
        &self,
        account: &StorageAccount,
        container: &str,
        blob_name: &str,
        content: Vec<u8>,
    ) -> Result<Url, StorageError>;
}
