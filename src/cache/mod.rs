//! Response cache for resolved variables.
//!
//! Resolving a full release vector tree means many network round trips, so
//! the facts produced by a successful run are written to a JSON file and
//! returned as-is by later runs. The cache has no expiry: delete the file
//! (`release-vector cache clean`) to force a fresh resolution.
//!
//! # Cache Location
//!
//! - **Default**: `<system temp dir>/release-vector-cache.json`
//! - **Override**: `cache_dir` in the global configuration
//!
//! There is no locking. Concurrent runs write through a temporary file and a
//! rename, so a reader sees either the old or the new content and the last
//! writer wins.

use anyhow::{Context, Result};
use serde_yaml::Mapping;
use std::path::{Path, PathBuf};

use crate::config::GlobalConfig;
use crate::constants::CACHE_FILE_NAME;
use crate::utils::{read_json_file, remove_file_if_exists, write_json_file};

/// A JSON file holding the facts of the last successful resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseCache {
    path: PathBuf,
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(std::env::temp_dir().join(CACHE_FILE_NAME))
    }
}

impl ResponseCache {
    /// A cache stored at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
        }
    }

    /// The cache location configured in `config`.
    pub fn from_config(config: &GlobalConfig) -> Result<Self> {
        Ok(Self::new(config.cache_file()?))
    }

    /// Location of the cache file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the cached facts, `None` when no cache file exists.
    pub fn load(&self) -> Result<Option<Mapping>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let facts: Mapping = read_json_file(&self.path)
            .with_context(|| format!("Failed to read response cache {}", self.path.display()))?;
        tracing::debug!("Loaded {} cached facts from {}", facts.len(), self.path.display());
        Ok(Some(facts))
    }

    /// Replace the cached facts.
    pub fn store(&self, facts: &Mapping) -> Result<()> {
        write_json_file(&self.path, facts, false)
            .with_context(|| format!("Failed to write response cache {}", self.path.display()))?;
        tracing::debug!("Wrote {} facts to {}", facts.len(), self.path.display());
        Ok(())
    }

    /// Delete the cache file. Returns whether a file was removed.
    pub fn clear(&self) -> Result<bool> {
        remove_file_if_exists(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_yaml::Value;
    use tempfile::TempDir;

    fn facts(yaml: &str) -> Mapping {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_missing_file_is_empty_cache() {
        let temp = TempDir::new().unwrap();
        let cache = ResponseCache::new(temp.path().join(CACHE_FILE_NAME));
        assert_eq!(cache.load().unwrap(), None);
    }

    #[test]
    fn test_store_then_load() {
        let temp = TempDir::new().unwrap();
        let cache = ResponseCache::new(temp.path().join("sub").join(CACHE_FILE_NAME));
        let stored = facts("metal_api_image_tag: v0.7.8\nports: [1, 2]\n_release_vectors_already_resolved: true\n");

        cache.store(&stored).unwrap();
        let loaded = cache.load().unwrap().unwrap();
        assert_eq!(loaded.get("metal_api_image_tag").and_then(Value::as_str), Some("v0.7.8"));
        assert_eq!(loaded.get("ports").and_then(Value::as_sequence).map(Vec::len), Some(2));
        assert_eq!(loaded.get("_release_vectors_already_resolved"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_store_overwrites_previous_content() {
        let temp = TempDir::new().unwrap();
        let cache = ResponseCache::new(temp.path().join(CACHE_FILE_NAME));
        cache.store(&facts("a: 1\n")).unwrap();
        cache.store(&facts("b: 2\n")).unwrap();

        let loaded = cache.load().unwrap().unwrap();
        assert!(!loaded.contains_key("a"));
        assert!(loaded.contains_key("b"));
        assert!(!temp.path().join("release-vector-cache.tmp").exists());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CACHE_FILE_NAME);
        std::fs::write(&path, "{not json").unwrap();
        assert!(ResponseCache::new(&path).load().is_err());
    }

    #[test]
    fn test_clear() {
        let temp = TempDir::new().unwrap();
        let cache = ResponseCache::new(temp.path().join(CACHE_FILE_NAME));
        assert!(!cache.clear().unwrap());
        cache.store(&facts("a: 1\n")).unwrap();
        assert!(cache.clear().unwrap());
        assert!(!cache.path().exists());
    }

    #[test]
    fn test_from_config_uses_cache_dir() {
        let config = GlobalConfig {
            cache_dir: Some("/var/cache/rv".to_string()),
            ..GlobalConfig::default()
        };
        let cache = ResponseCache::from_config(&config).unwrap();
        assert_eq!(cache.path(), Path::new("/var/cache/rv").join(CACHE_FILE_NAME));
    }
}
