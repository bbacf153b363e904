//! Merging local app settings into the remote set.
//!
//! Keys missing remotely, or whose values already agree case-insensitively, are
//! copied without asking. Every other local key is a conflict, resolved either by
//! the overwrite flag or by asking a [`ConflictPrompt`] until it gives a terminal
//! answer. The merge itself performs no I/O.

use std::io;

use thiserror::Error;
use tracing::{debug, info};

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::settings::{values_equal, SettingsMap};

/// How a single conflicting key is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictDecision {
    Overwrite,
    Keep,
    /// Show both values, then ask again.
    Reveal,
}

impl ConflictDecision {
    /// Parses a prompt answer. `None` means the answer is not recognised.
    pub fn from_answer(answer: &str) -> Option<Self> {
        let answer = answer.trim();
        if answer.eq_ignore_ascii_case("yes") || answer.eq_ignore_ascii_case("overwrite") {
            Some(ConflictDecision::Overwrite)
        } else if answer.eq_ignore_ascii_case("no") || answer.eq_ignore_ascii_case("keep") {
            Some(ConflictDecision::Keep)
        } else if answer.eq_ignore_ascii_case("show") {
            Some(ConflictDecision::Reveal)
        } else {
            None
        }
    }
}

/// Source of answers for conflicting keys.
///
/// `ask` returns the raw answer, or `Ok(None)` once input has ended.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait ConflictPrompt {
    fn ask(&mut self, key: &str, remote_value: &str, local_value: &str)
        -> io::Result<Option<String>>;

    /// Shows both values after a `show` answer.
    fn reveal(&mut self, key: &str, remote_value: &str, local_value: &str) -> io::Result<()>;
}

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("input ended before the conflict on `{key}` was resolved")]
    EndOfInput { key: String },

    #[error("prompt failed: {0}")]
    Io(#[from] io::Error),
}

/// What happened to one local key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Not present remotely.
    Added,
    /// Present remotely with an equal value.
    Unchanged,
    /// Remote value replaced; `forced` when the overwrite flag decided it.
    Overwritten { forced: bool },
    /// Remote value kept.
    Kept,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyResolution {
    pub key: String,
    pub resolution: Resolution,
}

/// Merged settings plus a record of each local key's resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub settings: SettingsMap,
    pub resolutions: Vec<KeyResolution>,
}

impl Reconciliation {
    pub fn changed_keys(&self) -> impl Iterator<Item = &str> {
        self.resolutions.iter().filter_map(|r| match r.resolution {
            Resolution::Added | Resolution::Overwritten { .. } => Some(r.key.as_str()),
            Resolution::Unchanged | Resolution::Kept => None,
        })
    }
}

enum PromptState {
    Awaiting,
    Resolved(ConflictDecision),
}

fn ask_until_resolved(
    prompt: &mut dyn ConflictPrompt,
    key: &str,
    remote_value: &str,
    local_value: &str,
) -> Result<ConflictDecision, PromptError> {
    let mut state = PromptState::Awaiting;
    loop {
        match state {
            PromptState::Resolved(decision) => return Ok(decision),
            PromptState::Awaiting => {
                let Some(answer) = prompt.ask(key, remote_value, local_value)? else {
                    return Err(PromptError::EndOfInput {
                        key: key.to_string(),
                    });
                };
                match ConflictDecision::from_answer(&answer) {
                    Some(ConflictDecision::Reveal) => {
                        prompt.reveal(key, remote_value, local_value)?;
                    }
                    Some(decision) => state = PromptState::Resolved(decision),
                    None => debug!(key, answer = %answer, "Unrecognised answer, asking again"),
                }
            }
        }
    }
}

/// Merges `local` into `remote`, recording how each local key was resolved.
pub fn reconcile(
    remote: &SettingsMap,
    local: &SettingsMap,
    overwrite_all: bool,
    prompt: &mut dyn ConflictPrompt,
) -> Result<Reconciliation, PromptError> {
    let mut settings = remote.clone();
    let mut resolutions = Vec::with_capacity(local.len());

    for (key, local_value) in local.iter() {
        let resolution = match remote.get(key) {
            None => {
                settings.insert(key, local_value);
                Resolution::Added
            }
            Some(remote_value) if values_equal(remote_value, local_value) => Resolution::Unchanged,
            Some(_) if overwrite_all => {
                settings.insert(key, local_value);
                Resolution::Overwritten { forced: true }
            }
            Some(remote_value) => {
                match ask_until_resolved(prompt, key, remote_value, local_value)? {
                    ConflictDecision::Overwrite => {
                        settings.insert(key, local_value);
                        Resolution::Overwritten { forced: false }
                    }
                    _ => Resolution::Kept,
                }
            }
        };
        debug!(key, ?resolution, "Resolved setting");
        resolutions.push(KeyResolution {
            key: key.to_string(),
            resolution,
        });
    }

    info!(
        local = local.len(),
        remote = remote.len(),
        merged = settings.len(),
        "Reconciled settings"
    );
    Ok(Reconciliation {
        settings,
        resolutions,
    })
}

/// Merges `local` into `remote` and returns only the resulting settings.
pub fn merge(
    remote: &SettingsMap,
    local: &SettingsMap,
    overwrite_all: bool,
    prompt: &mut dyn ConflictPrompt,
) -> Result<SettingsMap, PromptError> {
    reconcile(remote, local, overwrite_all, prompt).map(|r| r.settings)
}
