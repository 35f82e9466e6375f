//! Global configuration management for release-vector.
//!
//! The global configuration file (`~/.release-vector/config.toml`) stores
//! user-wide settings: where roles are installed, where the response cache
//! lives, timeouts and the name of the signature verification binary.
//! Registry credentials are deliberately not part of it; they belong to the
//! vector specification.
//!
//! # Configuration File Location
//!
//! - **Unix/macOS**: `~/.release-vector/config.toml`
//! - **Windows**: `%LOCALAPPDATA%\release-vector\config.toml`
//!
//! The location can be overridden with `--config` or the
//! `RELEASE_VECTOR_CONFIG` environment variable.
//!
//! # File Format
//!
//! ```toml
//! # Roles are installed below the first entry
//! roles_path = ["~/.ansible/roles", "/etc/ansible/roles"]
//!
//! # Directory of the response cache file (defaults to the system temp dir)
//! cache_dir = "/var/tmp"
//!
//! http_timeout_secs = 60
//! git_timeout_secs = 120
//! cosign_binary = "cosign"
//! ```
//!
//! The `ANSIBLE_ROLES_PATH` environment variable (colon separated) takes
//! precedence over `roles_path`, like it does for Ansible itself.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

use crate::constants::{
    CACHE_FILE_NAME, CONFIG_PATH_ENV, DEFAULT_HTTP_TIMEOUT, DEFAULT_ROLES_PATH, GIT_CLONE_TIMEOUT,
    ROLES_PATH_ENV,
};

/// Global configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct GlobalConfig {
    /// Roles search path; roles are installed below the first entry.
    #[serde(default = "default_roles_path")]
    pub roles_path: Vec<String>,

    /// Directory holding the response cache file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<String>,

    /// Timeout of a single HTTP request in seconds.
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    /// Timeout of a git clone in seconds.
    #[serde(default = "default_git_timeout_secs")]
    pub git_timeout_secs: u64,

    /// Name or path of the cosign binary.
    #[serde(default = "default_cosign_binary")]
    pub cosign_binary: String,
}

fn default_roles_path() -> Vec<String> {
    DEFAULT_ROLES_PATH.iter().map(|p| (*p).to_string()).collect()
}

const fn default_http_timeout_secs() -> u64 {
    DEFAULT_HTTP_TIMEOUT.as_secs()
}

const fn default_git_timeout_secs() -> u64 {
    GIT_CLONE_TIMEOUT.as_secs()
}

fn default_cosign_binary() -> String {
    "cosign".to_string()
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            roles_path: default_roles_path(),
            cache_dir: None,
            http_timeout_secs: default_http_timeout_secs(),
            git_timeout_secs: default_git_timeout_secs(),
            cosign_binary: default_cosign_binary(),
        }
    }
}

impl GlobalConfig {
    /// Load the configuration from the default location, or defaults if the
    /// file does not exist.
    pub async fn load() -> Result<Self> {
        Self::load_with_optional(None).await
    }

    /// Load from an explicit path if given, else from `RELEASE_VECTOR_CONFIG`,
    /// else from the default location. A missing file yields defaults; an
    /// explicitly given path must exist.
    pub async fn load_with_optional(path: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from(&path).await;
        }

        let path = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.is_empty() => PathBuf::from(path),
            _ => Self::default_path()?,
        };
        if path.exists() {
            Self::load_from(&path).await
        } else {
            Ok(Self::default())
        }
    }

    /// Load the configuration from a specific file.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read global config from {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse global config from {}", path.display()))
    }

    /// Write the configuration to a specific file, creating parent
    /// directories.
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize global config")?;

        fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write global config to {}", path.display()))
    }

    /// Default configuration file path.
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = if cfg!(target_os = "windows") {
            dirs::data_local_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine local data directory"))?
                .join("release-vector")
        } else {
            dirs::home_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine home directory"))?
                .join(".release-vector")
        };

        Ok(config_dir.join("config.toml"))
    }

    /// The effective roles search path with `~` and environment variables
    /// expanded. `ANSIBLE_ROLES_PATH` wins over the configured list.
    pub fn roles_search_path(&self) -> Result<Vec<PathBuf>> {
        let entries: Vec<String> = match std::env::var(ROLES_PATH_ENV) {
            Ok(value) => value.split(':').filter(|p| !p.is_empty()).map(str::to_string).collect(),
            Err(_) => self.roles_path.clone(),
        };

        entries
            .iter()
            .map(|entry| {
                shellexpand::full(entry)
                    .map(|expanded| PathBuf::from(expanded.as_ref()))
                    .with_context(|| format!("Failed to expand roles path entry {entry}"))
            })
            .collect()
    }

    /// Location of the response cache file.
    pub fn cache_file(&self) -> Result<PathBuf> {
        let dir = match &self.cache_dir {
            Some(dir) => PathBuf::from(
                shellexpand::full(dir)
                    .with_context(|| format!("Failed to expand cache_dir {dir}"))?
                    .as_ref(),
            ),
            None => std::env::temp_dir(),
        };
        Ok(dir.join(CACHE_FILE_NAME))
    }

    /// HTTP request timeout.
    pub const fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Git clone timeout.
    pub const fn git_timeout(&self) -> Duration {
        Duration::from_secs(self.git_timeout_secs)
    }
}
