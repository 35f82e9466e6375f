//! Typed wrapper around a parsed release vector.
//!
//! A release vector has no fixed schema. Consumers address values through
//! dotted paths (`docker-images.metal-stack.control-plane.metal-api.tag`), so
//! the only read operation a [`Document`] exposes is [`Document::get_path`].
//! The underlying representation is a [`serde_yaml::Value`], a tagged union of
//! null, bool, number, string, sequence and mapping.
//!
//! Lookups that fail return [`PathNotFound`], which is deliberately not a
//! [`crate::core::VectorError`]: whether a missing path is fatal depends on
//! the caller (mapping evaluation skips it, nested references fail on it).

use anyhow::Result;
use serde_yaml::{Mapping, Value};
use std::fmt;

use crate::core::VectorError;

/// A dotted path that does not resolve inside a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathNotFound {
    /// The full dotted path that was looked up
    pub path: String,
    /// The first segment that could not be resolved
    pub segment: String,
}

impl fmt::Display for PathNotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "key '{}' of path {} not found", self.segment, self.path)
    }
}

impl std::error::Error for PathNotFound {}

/// Resolve a dotted path inside any YAML value.
///
/// Every segment must name a key of a mapping. Sequences are not indexed,
/// matching how release vectors are addressed.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Result<&'a Value, PathNotFound> {
    let mut current = value;
    for segment in path.split('.') {
        current = current
            .as_mapping()
            .and_then(|mapping| mapping.get(segment))
            .ok_or_else(|| PathNotFound {
                path: path.to_string(),
                segment: segment.to_string(),
            })?;
    }
    Ok(current)
}

/// A parsed release vector together with the location it was loaded from.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    source: String,
    root: Value,
}

impl Document {
    /// Wrap an already parsed value.
    pub fn new(source: impl Into<String>, root: Value) -> Self {
        Self {
            source: source.into(),
            root,
        }
    }

    /// Parse YAML (or JSON) text fetched from `source`.
    ///
    /// An empty document parses to null, like an empty YAML file does.
    pub fn parse(text: &str, source: &str) -> Result<Self> {
        let root: Value =
            serde_yaml::from_str(text).map_err(|e| VectorError::DocumentParseError {
                url: source.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self::new(source, root))
    }

    /// The URL or reference this document was loaded from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The root value.
    pub fn root(&self) -> &Value {
        &self.root
    }

    /// Resolve a dotted path.
    pub fn get_path(&self, path: &str) -> Result<&Value, PathNotFound> {
        lookup(&self.root, path)
    }

    /// Resolve a dotted path that must point to a mapping.
    ///
    /// Missing paths and non-mapping values are both fatal
    /// [`VectorError::PathNotFound`] errors here, since the caller needs the
    /// mapping to continue.
    pub fn mapping(&self, path: &str) -> Result<&Mapping> {
        let value = self.get_path(path).map_err(|_| VectorError::PathNotFound {
            path: path.to_string(),
            url: self.source.clone(),
        })?;
        value.as_mapping().ok_or_else(|| {
            VectorError::InvalidSpec {
                url: self.source.clone(),
                reason: format!("value at {path} is not a mapping"),
            }
            .into()
        })
    }

    /// Replace `old` with `new` in every string value stored under `key`,
    /// anywhere in the nested mappings of the document.
    ///
    /// Only mapping values are descended into; sequences are left alone.
    /// Returns the number of values that changed.
    pub fn replace_key_value(&mut self, key: &str, old: &str, new: &str) -> usize {
        replace_in(&mut self.root, key, old, new)
    }
}

fn replace_in(value: &mut Value, key: &str, old: &str, new: &str) -> usize {
    let Some(mapping) = value.as_mapping_mut() else {
        return 0;
    };

    let mut changed = 0;
    if let Some(Value::String(current)) = mapping.get_mut(key) {
        let replaced = current.replace(old, new);
        if replaced != *current {
            tracing::debug!("Replaced value {} with {}", current, replaced);
            *current = replaced;
            changed += 1;
        }
    }

    for (_, child) in mapping.iter_mut() {
        if child.is_mapping() {
            changed += replace_in(child, key, old, new);
        }
    }

    changed
}
