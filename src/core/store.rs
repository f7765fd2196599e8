use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, warn};

use crate::core::notifier::normalize_threshold;

const STATE_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to write state: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to serialize state: {0}")]
    Serialize(#[from] serde_json::Error),
}

fn default_true() -> bool {
    true
}

/// Everything that survives a restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default)]
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
    #[serde(default)]
    pub last_notified_threshold: u8,
    #[serde(default = "default_true")]
    pub notifications_enabled: bool,
    #[serde(default)]
    pub launch_at_login: bool,
}

impl Default for PersistedState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            credential: None,
            last_notified_threshold: 0,
            notifications_enabled: true,
            launch_at_login: false,
        }
    }
}

/// Durable home of the session credential and notification bookkeeping.
///
/// Other `ubar` processes may write the same file, so every mutation re-reads
/// it, applies the change to a copy, and only adopts the copy once the write
/// (temp file + rename) has succeeded.
#[derive(Debug)]
pub struct CredentialStore {
    path: PathBuf,
    state: PersistedState,
}

impl CredentialStore {
    /// Default state file, respecting XDG_DATA_HOME
    pub fn state_path() -> PathBuf {
        let base = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("~"))
                    .join(".local")
                    .join("share")
            });
        base.join("ubar").join("state.json")
    }

    pub fn open_default() -> Self {
        Self::open(Self::state_path())
    }

    /// Load the store at `path`. A missing or unreadable file yields fresh defaults.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = read_state(&path);
        Self { path, state }
    }

    /// Pick up changes written by other processes since the last read.
    pub fn reload(&mut self) {
        self.state = read_state(&self.path);
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current credential; an empty string counts as unset.
    pub fn get(&self) -> Option<&str> {
        self.state
            .credential
            .as_deref()
            .filter(|c| !c.trim().is_empty())
    }

    pub fn set(&mut self, credential: &str) -> Result<(), StoreError> {
        debug!("Saving credential, length: {}", credential.len());
        self.update(|state| state.credential = Some(credential.to_string()))
    }

    /// Remove the credential and re-arm every threshold.
    pub fn clear(&mut self) -> Result<(), StoreError> {
        debug!("Clearing credential");
        self.update(|state| {
            state.credential = None;
            state.last_notified_threshold = 0;
        })
    }

    pub fn load_notified_threshold(&self) -> u8 {
        self.state.last_notified_threshold
    }

    pub fn save_notified_threshold(&mut self, threshold: u8) -> Result<(), StoreError> {
        let threshold = normalize_threshold(threshold);
        self.update(|state| state.last_notified_threshold = threshold)
    }

    pub fn notifications_enabled(&self) -> bool {
        self.state.notifications_enabled
    }

    pub fn set_notifications_enabled(&mut self, enabled: bool) -> Result<(), StoreError> {
        self.update(|state| state.notifications_enabled = enabled)
    }

    pub fn launch_at_login(&self) -> bool {
        self.state.launch_at_login
    }

    pub fn set_launch_at_login(&mut self, enabled: bool) -> Result<(), StoreError> {
        self.update(|state| state.launch_at_login = enabled)
    }

    /// Read-modify-write against the file on disk. `self.state` is untouched on error.
    fn update(&mut self, apply: impl FnOnce(&mut PersistedState)) -> Result<(), StoreError> {
        let current = read_state(&self.path);
        let mut next = current.clone();
        apply(&mut next);
        if next != current || !self.path.exists() {
            write_state(&self.path, &next)?;
        }
        self.state = next;
        Ok(())
    }
}

fn read_state(path: &Path) -> PersistedState {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(_) => return PersistedState::default(),
    };
    match serde_json::from_str::<PersistedState>(&content) {
        Ok(mut state) if state.version <= STATE_VERSION => {
            state.version = STATE_VERSION;
            state.last_notified_threshold = normalize_threshold(state.last_notified_threshold);
            state
        }
        Ok(state) => {
            warn!(
                "State file {} has newer version {}, ignoring it",
                path.display(),
                state.version
            );
            PersistedState::default()
        }
        Err(e) => {
            warn!("Failed to parse state file {}: {}", path.display(), e);
            PersistedState::default()
        }
    }
}

fn write_state(path: &Path, state: &PersistedState) -> Result<(), StoreError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let json = serde_json::to_string_pretty(state)?;
    let mut temp_file = NamedTempFile::new_in(parent)?;
    temp_file.write_all(json.as_bytes())?;
    temp_file.persist(path).map_err(|e| e.error)?;
    Ok(())
}
