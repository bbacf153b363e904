//! Uploading packages to blob storage and issuing their read URLs.

use chrono::{DateTime, Duration, Months, Utc};
use reqwest::Url;
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

use crate::archive::Package;
use crate::contract::{BlobStore, StorageError};
use crate::sas::{SasError, StorageAccount};

/// Container every release package is stored in.
pub const RELEASE_CONTAINER: &str = "function-releases";

/// Token start is backdated by this many minutes to tolerate clock skew.
pub const CLOCK_SKEW_MINUTES: i64 = 5;

/// Lifetime of the read token handed to the Function App.
pub const READ_TOKEN_YEARS: u32 = 20;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("failed to sign blob URL: {0}")]
    Sign(#[source] SasError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SasPermission {
    Read,
}

/// Blob URI plus a read-only token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedUploadUrl {
    pub base_uri: Url,
    pub token: String,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub permission: SasPermission,
}

impl SignedUploadUrl {
    pub fn as_url(&self) -> Url {
        let mut url = self.base_uri.clone();
        url.set_query(Some(&self.token));
        url
    }
}

impl std::fmt::Display for SignedUploadUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_url())
    }
}

/// `{unix_seconds}-{uuid}.zip`
pub fn blob_name(now: DateTime<Utc>, id: Uuid) -> String {
    format!("{}-{}.zip", now.timestamp(), id)
}

/// Outcome of a successful upload.
#[derive(Debug, Clone)]
pub struct UploadedPackage {
    pub blob_name: String,
    pub url: SignedUploadUrl,
}

pub async fn upload_package<B: BlobStore + ?Sized>(
    store: &B,
    account: &StorageAccount,
    package: &Package,
) -> Result<UploadedPackage, UploadError> {
    upload_package_at(store, account, package, Utc::now(), Uuid::new_v4()).await
}

/// [`upload_package`] with a fixed clock and blob id.
pub async fn upload_package_at<B: BlobStore + ?Sized>(
    store: &B,
    account: &StorageAccount,
    package: &Package,
    now: DateTime<Utc>,
    id: Uuid,
) -> Result<UploadedPackage, UploadError> {
    let blob_name = blob_name(now, id);
    info!(
        container = RELEASE_CONTAINER,
        blob = %blob_name,
        bytes = package.size_bytes(),
        "Uploading package"
    );

    store
        .ensure_container(account, RELEASE_CONTAINER)
        .await
        .map_err(|e| {
            error!(error = %e, container = RELEASE_CONTAINER, "Failed to ensure container");
            e
        })?;
    let base_uri = store
        .put_blob(account, RELEASE_CONTAINER, &blob_name, package.bytes().to_vec())
        .await
        .map_err(|e| {
            error!(error = %e, blob = %blob_name, "Failed to upload package");
            e
        })?;

    let url = sign_read_url(account, base_uri, &blob_name, now).map_err(|e| {
        error!(error = %e, blob = %blob_name, "Package uploaded but signing failed; blob left orphaned");
        UploadError::Sign(e)
    })?;
    info!(blob = %blob_name, valid_until = %url.valid_until, "Package uploaded");
    Ok(UploadedPackage { blob_name, url })
}

fn sign_read_url(
    account: &StorageAccount,
    base_uri: Url,
    blob_name: &str,
    now: DateTime<Utc>,
) -> Result<SignedUploadUrl, SasError> {
    if base_uri.cannot_be_a_base() {
        return Err(SasError::InvalidEndpoint(base_uri.to_string()));
    }
    let valid_from = now - Duration::minutes(CLOCK_SKEW_MINUTES);
    let valid_until = now
        .checked_add_months(Months::new(12 * READ_TOKEN_YEARS))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);
    let token = account.blob_read_token(RELEASE_CONTAINER, blob_name, valid_from, valid_until);
    Ok(SignedUploadUrl {
        base_uri,
        token,
        valid_from,
        valid_until,
        permission: SasPermission::Read,
    })
}
