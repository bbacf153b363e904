//! App settings as case-insensitive key/value maps.
//!
//! Keys are looked up case-insensitively but keep the casing they were first
//! stored with. Replacing a value keeps the existing key's casing.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// File holding the project's local app settings.
pub const LOCAL_SETTINGS_FILE: &str = "local.settings.json";

/// String settings keyed case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<String, String>",
    into = "BTreeMap<String, String>"
)]
pub struct SettingsMap {
    // folded key -> (original key, value)
    entries: BTreeMap<String, (String, String)>,
}

fn fold(key: &str) -> String {
    key.to_lowercase()
}

/// Case-insensitive string equality used for setting values.
pub fn values_equal(a: &str, b: &str) -> bool {
    a == b || a.to_lowercase() == b.to_lowercase()
}

impl SettingsMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `key`, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let key = key.into();
        let value = value.into();
        match self.entries.get_mut(&fold(&key)) {
            Some((_, existing)) => Some(std::mem::replace(existing, value)),
            None => {
                self.entries.insert(fold(&key), (key, value));
                None
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(&fold(key)).map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(&fold(key))
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries.remove(&fold(key)).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pairs with their stored casing, ordered case-insensitively by key.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.values().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.iter().map(|(k, _)| k)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SettingsMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = SettingsMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl From<BTreeMap<String, String>> for SettingsMap {
    fn from(raw: BTreeMap<String, String>) -> Self {
        raw.into_iter().collect()
    }
}

impl From<SettingsMap> for BTreeMap<String, String> {
    fn from(map: SettingsMap) -> Self {
        map.entries.into_values().collect()
    }
}

#[derive(Debug, Error)]
pub enum LocalSettingsError {
    #[error("{} not found", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{} is encrypted; decrypt it before publishing", .0.display())]
    Encrypted(PathBuf),
}

/// On-disk shape of `local.settings.json`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LocalSettingsFile {
    #[serde(default)]
    is_encrypted: bool,
    #[serde(default)]
    values: SettingsMap,
}

/// Reads the `Values` section of the project's `local.settings.json`.
pub fn read_local_settings(project_root: &Path) -> Result<SettingsMap, LocalSettingsError> {
    let path = project_root.join(LOCAL_SETTINGS_FILE);
    let text = fs::read_to_string(&path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            LocalSettingsError::NotFound(path.clone())
        } else {
            LocalSettingsError::Io {
                path: path.clone(),
                source,
            }
        }
    })?;
    let file: LocalSettingsFile =
        serde_json::from_str(&text).map_err(|source| LocalSettingsError::Parse {
            path: path.clone(),
            source,
        })?;
    if file.is_encrypted {
        return Err(LocalSettingsError::Encrypted(path));
    }
    info!(path = %path.display(), settings = file.values.len(), "Loaded local settings");
    debug!(keys = ?file.values.keys().collect::<Vec<_>>(), "Local setting keys");
    Ok(file.values)
}
