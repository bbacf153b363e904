/// `load_config` module: Loads the static YAML config naming the target Function App and
/// injects the ARM access token from the environment.
///
/// This module is the only place where user-supplied YAML is parsed.
///
/// # Responsibilities
/// - Parse the YAML file into [`CliConfig`]
/// - Inject secrets from the environment (`AZURE_ACCESS_TOKEN`); they never live in the file
/// - Produce clear diagnostics: any failure results in an `anyhow::Error` naming the file
///
/// For the accepted YAML schema, see the README.
use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::{error, info};

/// Config file looked up in the project root when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "func-publish.yaml";

/// Environment variable holding the ARM bearer token.
pub const ACCESS_TOKEN_ENV: &str = "AZURE_ACCESS_TOKEN";

pub const DEFAULT_ARM_ENDPOINT: &str = "https://management.azure.com";

#[derive(Debug, Clone, Deserialize)]
pub struct FunctionAppSection {
    pub subscription_id: String,
    pub resource_group: String,
}

#[derive(Clone)]
pub struct CliConfig {
    pub function_app: FunctionAppSection,
    pub arm_endpoint: String,
    pub access_token: String,
}

impl std::fmt::Debug for CliConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CliConfig")
            .field("function_app", &self.function_app)
            .field("arm_endpoint", &self.arm_endpoint)
            .field("access_token", &"****")
            .finish()
    }
}

/// Loads a static YAML config file (no secrets) and injects the access token from the environment.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow!("Failed to read config file {:?}: {}", path_ref, e));
        }
    };

    #[derive(Debug, Deserialize)]
    struct RawConfig {
        function_app: FunctionAppSection,
        #[serde(default)]
        arm_endpoint: Option<String>,
    }

    let raw: RawConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    let access_token = std::env::var(ACCESS_TOKEN_ENV).map_err(|e| {
        error!(error = ?e, "{ACCESS_TOKEN_ENV} missing in environment");
        anyhow!("{ACCESS_TOKEN_ENV} must be set to an ARM access token")
    })?;

    let config = CliConfig {
        function_app: raw.function_app,
        arm_endpoint: raw
            .arm_endpoint
            .unwrap_or_else(|| DEFAULT_ARM_ENDPOINT.to_string())
            .trim_end_matches('/')
            .to_string(),
        access_token,
    };
    info!(
        subscription_id = %config.function_app.subscription_id,
        resource_group = %config.function_app.resource_group,
        arm_endpoint = %config.arm_endpoint,
        "Loaded CliConfig"
    );
    Ok(config)
}
