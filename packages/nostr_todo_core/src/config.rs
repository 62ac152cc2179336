//! Local configuration
//!
//! One JSON file per profile under `<config dir>/nostr-todo/`:
//! `config.json` for the default profile and `config-<name>.json` for
//! named ones. The file holds the relay list and the private key.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identity::{Credential, IdentityError};
use crate::relay::RelayUrl;
use crate::sync::AcceptancePolicy;

/// Relay used when a profile lists none.
pub const DEFAULT_RELAY: &str = "wss://yabu.me";

const APP_DIR: &str = "nostr-todo";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Invalid config {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("Could not determine the user config directory")]
    NoConfigDir,

    #[error("Invalid relay address: {0}")]
    InvalidRelay(String),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub relays: Vec<String>,

    /// `nsec1...` or 64 hex characters
    #[serde(rename = "privatekey", default)]
    pub private_key: String,

    /// Minimum number of relays that must accept a write. Absent or zero
    /// means best effort.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_accepted: Option<usize>,
}

impl Config {
    /// Read a config file. An empty relay list falls back to [`DEFAULT_RELAY`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read(path).map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        let mut config: Config = serde_json::from_slice(&data).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        if config.relays.is_empty() {
            config.relays.push(DEFAULT_RELAY.to_string());
        }
        Ok(config)
    }

    /// Load the config for `profile` (`""` is the default profile).
    pub fn load_profile(profile: &str) -> Result<Self, ConfigError> {
        Self::load(&profile_path(&config_dir()?, profile))
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io(e.to_string()))?;
        }

        let json = serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        std::fs::write(path, json).map_err(|e| ConfigError::Io(e.to_string()))?;

        Ok(())
    }

    /// Parsed relay addresses, in file order. Fails on the first bad one.
    pub fn relay_urls(&self) -> Result<Vec<RelayUrl>, ConfigError> {
        self.relays
            .iter()
            .map(|r| RelayUrl::parse(r).map_err(|e| ConfigError::InvalidRelay(e.to_string())))
            .collect()
    }

    pub fn acceptance_policy(&self) -> AcceptancePolicy {
        AcceptancePolicy::from_min_accepted(self.min_accepted)
    }

    pub fn credential(&self) -> Result<Credential, IdentityError> {
        Credential::from_secret(&self.private_key)
    }
}

/// `~/.config/nostr-todo` on macOS, the platform config directory elsewhere.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    let base = if cfg!(target_os = "macos") {
        dirs::home_dir().map(|home| home.join(".config"))
    } else {
        dirs::config_dir()
    };
    base.map(|dir| dir.join(APP_DIR)).ok_or(ConfigError::NoConfigDir)
}

pub fn profile_path(dir: &Path, profile: &str) -> PathBuf {
    if profile.is_empty() {
        dir.join("config.json")
    } else {
        dir.join(format!("config-{}.json", profile))
    }
}

/// Names of the named profiles found in `dir`, sorted. A missing
/// directory has no profiles.
pub fn list_profiles(dir: &Path) -> Result<Vec<String>, ConfigError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(ConfigError::Io(e.to_string())),
    };

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ConfigError::Io(e.to_string()))?;
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        if let Some(name) = file_name
            .strip_prefix("config-")
            .and_then(|rest| rest.strip_suffix(".json"))
        {
            if !name.is_empty() {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}
