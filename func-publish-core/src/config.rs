use std::path::PathBuf;

use tracing::{debug, info};

use crate::ignore::IgnoreRuleSet;
use crate::settings::SettingsMap;

/// Everything a publish needs from the local side.
#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
    pub project_root: PathBuf,
    /// `None` when the project has no usable `.funcignore`.
    pub ignore_rules: Option<IgnoreRuleSet>,
    /// Values from `local.settings.json`, when they were read.
    pub local_settings: Option<SettingsMap>,
    pub publish_local_settings: bool,
    pub overwrite_settings: bool,
}

impl PublishOptions {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        PublishOptions {
            project_root: project_root.into(),
            ..Default::default()
        }
    }

    pub fn trace_loaded(&self) {
        info!(
            project_root = %self.project_root.display(),
            ignore_rules = self.ignore_rules.as_ref().map_or(0, |r| r.rules().len()),
            local_settings = self.local_settings.as_ref().map_or(0, SettingsMap::len),
            publish_local_settings = self.publish_local_settings,
            overwrite_settings = self.overwrite_settings,
            "Loaded PublishOptions"
        );
        debug!(
            local_keys = ?self
                .local_settings
                .as_ref()
                .map(|s| s.keys().collect::<Vec<_>>()),
            "PublishOptions loaded (keys only)"
        );
    }
}
