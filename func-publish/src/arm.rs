//! # ARM app-settings client
//!
//! Implements [`RemoteSettings`] against the Azure Resource Manager REST API for one
//! Function App. Authentication is a bearer token taken from the loaded config.
//!
//! - fetch: `POST .../config/appsettings/list`
//! - update: `PUT .../config/appsettings` with `{"properties": {...}}`

use async_trait::async_trait;
use func_publish_core::contract::{RemoteSettings, RemoteSettingsError};
use func_publish_core::settings::SettingsMap;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};

use crate::load_config::CliConfig;

pub const APP_SETTINGS_API_VERSION: &str = "2018-02-01";

pub struct ArmClient {
    http: Client,
    site_url: String,
    access_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct AppSettingsEnvelope {
    #[serde(default)]
    properties: SettingsMap,
}

impl ArmClient {
    pub fn new(config: &CliConfig, app_name: &str) -> Self {
        let site_url = format!(
            "{}/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Web/sites/{}",
            config.arm_endpoint,
            config.function_app.subscription_id,
            config.function_app.resource_group,
            app_name
        );
        tracing::info!(site = %site_url, "Initialized ArmClient");
        ArmClient {
            http: Client::new(),
            site_url,
            access_token: config.access_token.clone(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/config/{}?api-version={}",
            self.site_url, path, APP_SETTINGS_API_VERSION
        )
    }
}

async fn check(response: Response) -> Result<Response, RemoteSettingsError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let detail = response.text().await.unwrap_or_default();
    tracing::error!(status = status.as_u16(), detail = %detail, "ARM rejected request");
    Err(RemoteSettingsError::Rejected {
        status: status.as_u16(),
        detail,
    })
}

fn transport(e: reqwest::Error) -> RemoteSettingsError {
    tracing::error!(error = ?e, "ARM request failed");
    RemoteSettingsError::Transport(e.to_string())
}

#[async_trait]
impl RemoteSettings for ArmClient {
    async fn fetch_settings(&self) -> Result<SettingsMap, RemoteSettingsError> {
        tracing::info!("Fetching app settings");
        let response = self
            .http
            .post(self.endpoint("appsettings/list"))
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(transport)?;
        let envelope: AppSettingsEnvelope = check(response)
            .await?
            .json()
            .await
            .map_err(|e| RemoteSettingsError::Decode(e.to_string()))?;
        tracing::info!(settings = envelope.properties.len(), "Fetched app settings");
        Ok(envelope.properties)
    }

    async fn update_settings(&self, settings: &SettingsMap) -> Result<(), RemoteSettingsError> {
        tracing::info!(settings = settings.len(), "Updating app settings");
        let body = AppSettingsEnvelope {
            properties: settings.clone(),
        };
        let response = self
            .http
            .put(self.endpoint("appsettings"))
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        check(response).await?;
        tracing::info!("App settings updated");
        Ok(())
    }
}
