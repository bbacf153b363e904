//! High-level pipeline: orchestrates package → fetch settings → upload → persist.
//!
//! A full publish:
//!   - Builds the package from the project root and its ignore rules
//!   - Fetches the Function App's current app settings
//!   - Optionally reconciles `local.settings.json` into them (before upload, so an
//!     abandoned prompt leaves nothing behind in storage)
//!   - Uploads the package using the storage account named by `AzureWebJobsStorage`
//!   - Points `WEBSITE_USE_ZIP` at the signed package URL and persists the settings
//!
//! The settings-only path skips packaging and upload.
//!
//! # Stages
//! Progress is reported to an observer as [`PublishStage`] values. Stages only move
//! forward; any error emits [`PublishStage::Failed`] and returns immediately.
//!
//! # Error Handling
//! Fail-fast, no retries. A persist failure after a successful upload leaves the blob
//! in storage; its name is logged and carried in the error.

use tracing::{debug, error, info, warn};

use crate::archive::{build_package, ArchiveEntry, PackagingError};
use crate::config::PublishOptions;
use crate::contract::{BlobStore, RemoteSettings, RemoteSettingsError};
use crate::reconcile::{reconcile, ConflictPrompt, PromptError, Reconciliation};
use crate::sas::{SasError, StorageAccount};
use crate::settings::SettingsMap;
use crate::storage::{upload_package, SignedUploadUrl, UploadError};

/// Remote setting holding the storage connection string.
pub const STORAGE_CONNECTION_KEY: &str = "AzureWebJobsStorage";

/// Remote setting the signed package URL is written to.
pub const PACKAGE_URL_KEY: &str = "WEBSITE_USE_ZIP";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishStage {
    Start,
    ArchiveBuilt,
    SettingsFetched,
    Uploaded,
    SettingsUpdateAttempted,
    Succeeded,
    Failed,
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error(transparent)]
    Packaging(#[from] PackagingError),

    #[error("failed to fetch app settings: {0}")]
    FetchSettings(#[source] RemoteSettingsError),

    #[error(transparent)]
    Prompt(#[from] PromptError),

    #[error("local settings were requested but none were loaded")]
    MissingLocalSettings,

    #[error("app setting AzureWebJobsStorage is not set on the Function App")]
    MissingStorageConnection,

    #[error("invalid storage connection string: {0}")]
    StorageAccount(#[from] SasError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error("{source}")]
    UpdateSettings {
        /// Blob left in storage when the upload had already happened.
        orphaned_blob: Option<String>,
        #[source]
        source: RemoteSettingsError,
    },
}

#[derive(Debug)]
pub struct PublishReport {
    pub blob_name: String,
    pub package_url: SignedUploadUrl,
    pub entries: Vec<ArchiveEntry>,
    pub package_bytes: usize,
    pub sha256: String,
    /// Present when local settings were reconciled.
    pub reconciliation: Option<Reconciliation>,
}

#[derive(Debug)]
pub struct SettingsReport {
    pub reconciliation: Reconciliation,
}

/// Drives a publish against a settings store and a blob store.
pub struct Publisher<'a, R: ?Sized, B: ?Sized> {
    remote: &'a R,
    store: &'a B,
}

impl<'a, R, B> Publisher<'a, R, B>
where
    R: RemoteSettings + ?Sized,
    B: BlobStore + ?Sized,
{
    pub fn new(remote: &'a R, store: &'a B) -> Self {
        Publisher { remote, store }
    }

    pub async fn publish(
        &self,
        options: &PublishOptions,
        prompt: &mut dyn ConflictPrompt,
        on_stage: &mut dyn FnMut(PublishStage),
    ) -> Result<PublishReport, PublishError> {
        info!(root = %options.project_root.display(), "[PUBLISH] Starting publish");
        on_stage(PublishStage::Start);
        let result = self.run_publish(options, prompt, on_stage).await;
        finish(result, on_stage)
    }

    pub async fn publish_settings_only(
        &self,
        options: &PublishOptions,
        prompt: &mut dyn ConflictPrompt,
        on_stage: &mut dyn FnMut(PublishStage),
    ) -> Result<SettingsReport, PublishError> {
        info!("[PUBLISH] Starting settings-only publish");
        on_stage(PublishStage::Start);
        let result = self.run_settings_only(options, prompt, on_stage).await;
        finish(result, on_stage)
    }

    async fn run_publish(
        &self,
        options: &PublishOptions,
        prompt: &mut dyn ConflictPrompt,
        on_stage: &mut dyn FnMut(PublishStage),
    ) -> Result<PublishReport, PublishError> {
        let package = build_package(&options.project_root, options.ignore_rules.as_ref())?;
        on_stage(PublishStage::ArchiveBuilt);

        let remote = self.fetch().await?;
        on_stage(PublishStage::SettingsFetched);

        let reconciliation = if options.publish_local_settings {
            let local = options
                .local_settings
                .as_ref()
                .ok_or(PublishError::MissingLocalSettings)?;
            Some(reconcile(&remote, local, options.overwrite_settings, prompt)?)
        } else {
            None
        };

        let connection = remote
            .get(STORAGE_CONNECTION_KEY)
            .ok_or(PublishError::MissingStorageConnection)?;
        let account = StorageAccount::parse(connection)?;
        debug!(account = %account.account_name, "[PUBLISH] Resolved storage account");

        let uploaded = upload_package(self.store, &account, &package).await?;
        on_stage(PublishStage::Uploaded);

        let mut settings = reconciliation
            .as_ref()
            .map_or_else(|| remote.clone(), |r| r.settings.clone());
        settings.insert(PACKAGE_URL_KEY, uploaded.url.to_string());

        on_stage(PublishStage::SettingsUpdateAttempted);
        if let Err(source) = self.remote.update_settings(&settings).await {
            error!(
                error = %source,
                blob = %uploaded.blob_name,
                "[PUBLISH][ERROR] Settings update failed; uploaded package left in storage"
            );
            return Err(PublishError::UpdateSettings {
                orphaned_blob: Some(uploaded.blob_name),
                source,
            });
        }

        let sha256 = package.sha256();
        info!(blob = %uploaded.blob_name, sha256 = %sha256, "[PUBLISH] Publish complete");
        Ok(PublishReport {
            sha256,
            package_bytes: package.size_bytes(),
            entries: package.entries().to_vec(),
            blob_name: uploaded.blob_name,
            package_url: uploaded.url,
            reconciliation,
        })
    }

    async fn run_settings_only(
        &self,
        options: &PublishOptions,
        prompt: &mut dyn ConflictPrompt,
        on_stage: &mut dyn FnMut(PublishStage),
    ) -> Result<SettingsReport, PublishError> {
        let local = options
            .local_settings
            .as_ref()
            .ok_or(PublishError::MissingLocalSettings)?;

        let remote = self.fetch().await?;
        on_stage(PublishStage::SettingsFetched);

        let reconciliation = reconcile(&remote, local, options.overwrite_settings, prompt)?;

        on_stage(PublishStage::SettingsUpdateAttempted);
        self.remote
            .update_settings(&reconciliation.settings)
            .await
            .map_err(|source| {
                error!(error = %source, "[PUBLISH][ERROR] Settings update failed");
                PublishError::UpdateSettings {
                    orphaned_blob: None,
                    source,
                }
            })?;

        info!(
            changed = reconciliation.changed_keys().count(),
            "[PUBLISH] Settings published"
        );
        Ok(SettingsReport { reconciliation })
    }

    async fn fetch(&self) -> Result<SettingsMap, PublishError> {
        let remote = self.remote.fetch_settings().await.map_err(|e| {
            error!(error = %e, "[PUBLISH][ERROR] Failed to fetch app settings");
            PublishError::FetchSettings(e)
        })?;
        info!(settings = remote.len(), "[PUBLISH] Fetched app settings");
        Ok(remote)
    }
}

fn finish<T>(
    result: Result<T, PublishError>,
    on_stage: &mut dyn FnMut(PublishStage),
) -> Result<T, PublishError> {
    match &result {
        Ok(_) => on_stage(PublishStage::Succeeded),
        Err(e) => {
            warn!(error = %e, "[PUBLISH] Publish failed");
            on_stage(PublishStage::Failed);
        }
    }
    result
}
