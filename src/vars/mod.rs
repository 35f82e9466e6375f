//! The caller's variable namespace and the layered lookup built on top of it.
//!
//! [`TaskVars`] holds the variables that exist before any resolution runs:
//! inventory values, extra vars, user overrides. Resolved values never
//! overwrite a variable that is defined here.
//!
//! [`VariableLayers`] answers "where does this mapping come from" with a fixed
//! precedence:
//!
//! 1. an explicit mapping given in the vector specification
//! 2. task variables
//! 3. role defaults loaded through `include_role_defaults`
//!
//! The first path segment selects the layer, the rest of the path is
//! resolved inside that layer, so a task variable shadows a role default of
//! the same name as a whole.

use anyhow::{Context, Result};
use serde_yaml::{Mapping, Value};
use std::path::Path;

use crate::constants::FACTS_VAR;
use crate::core::VectorError;
use crate::document::{PathNotFound, lookup};

/// Variables defined before resolution starts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskVars {
    vars: Mapping,
}

impl TaskVars {
    /// Create an empty namespace.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing mapping.
    #[must_use]
    pub const fn from_mapping(vars: Mapping) -> Self {
        Self {
            vars,
        }
    }

    /// Load and merge YAML vars files. Later files override top-level keys of
    /// earlier ones.
    pub fn load_files<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let mut vars = Self::new();
        for path in paths {
            let path = path.as_ref();
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read vars file {}", path.display()))?;
            let value: Value = serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse vars file {}", path.display()))?;
            match value {
                Value::Mapping(mapping) => vars.extend(mapping),
                Value::Null => {}
                _ => {
                    return Err(VectorError::ConfigError {
                        message: format!("vars file {} must contain a mapping", path.display()),
                    }
                    .into());
                }
            }
        }
        Ok(vars)
    }

    /// Apply `key=value` assignments; the value is parsed as a YAML scalar so
    /// `true`, `1` and `~` keep their types.
    pub fn apply_extra_vars(&mut self, assignments: &[String]) -> Result<()> {
        for assignment in assignments {
            let (key, raw) = assignment.split_once('=').ok_or_else(|| VectorError::ConfigError {
                message: format!("extra var '{assignment}' must have the form key=value"),
            })?;
            let value: Value = serde_yaml::from_str(raw)
                .unwrap_or_else(|_| Value::String(raw.to_string()));
            self.insert(key.trim(), value);
        }
        Ok(())
    }

    /// Insert or replace a top-level variable.
    pub fn insert(&mut self, key: &str, value: Value) {
        self.vars.insert(Value::String(key.to_string()), value);
    }

    /// Merge another mapping at the top level.
    pub fn extend(&mut self, other: Mapping) {
        for (key, value) in other {
            self.vars.insert(key, value);
        }
    }

    /// Look up a top-level variable.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    /// Whether a variable is defined with a non-null value.
    ///
    /// Defined variables are protected from being overwritten by any resolved
    /// value.
    pub fn is_defined(&self, name: &str) -> bool {
        self.get(name).is_some_and(|value| !value.is_null())
    }

    /// Resolve a dotted path inside the namespace.
    pub fn get_path(&self, path: &str) -> Result<&Value, PathNotFound> {
        lookup_mapping(&self.vars, path)
    }

    /// The previously gathered facts.
    pub fn facts(&self) -> Option<&Mapping> {
        self.get(FACTS_VAR).and_then(Value::as_mapping)
    }

    /// Whether a boolean fact is set to true.
    pub fn fact_flag(&self, name: &str) -> bool {
        self.facts()
            .and_then(|facts| facts.get(name))
            .is_some_and(|value| value.as_bool().unwrap_or(false))
    }

    /// Read a boolean variable with Ansible's lenient conversion
    /// (`yes`, `on`, `1`, ...), falling back to `default` when unset.
    pub fn flag(&self, name: &str, default: bool) -> bool {
        self.get(name).map_or(default, |value| to_bool(value, default))
    }

    /// A `<role>_version` override for a role, if one is set.
    ///
    /// The role name is lower-cased and dashes become underscores, so
    /// `ansible-common` is overridden by `ansible_common_version`.
    pub fn version_override(&self, role: &str) -> Option<String> {
        let key = format!("{}_version", role_var_name(role));
        self.get(&key).and_then(scalar_to_string)
    }

    /// The underlying mapping.
    pub fn as_mapping(&self) -> &Mapping {
        &self.vars
    }
}

/// Turn a role or release name into its variable prefix.
#[must_use]
pub fn role_var_name(name: &str) -> String {
    name.replace('-', "_").to_lowercase()
}

/// Render a scalar as a string (strings, numbers, bools). Other values yield
/// `None`.
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Lenient boolean conversion following Ansible's `boolean(strict=False)`.
pub fn to_bool(value: &Value, default: bool) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_i64().map_or(default, |n| n == 1),
        Value::String(s) => matches!(
            s.to_lowercase().as_str(),
            "yes" | "on" | "1" | "true" | "t" | "y"
        ),
        Value::Null => default,
        _ => false,
    }
}

fn lookup_mapping<'a>(mapping: &'a Mapping, path: &str) -> Result<&'a Value, PathNotFound> {
    let (head, rest) = match path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    };
    let value = mapping.get(head).ok_or_else(|| PathNotFound {
        path: path.to_string(),
        segment: head.to_string(),
    })?;
    match rest {
        None => Ok(value),
        Some(rest) => lookup(value, rest).map_err(|e| PathNotFound {
            path: path.to_string(),
            segment: e.segment,
        }),
    }
}

/// Layered lookup over task variables and role defaults.
pub struct VariableLayers<'a> {
    layers: Vec<&'a Mapping>,
}

impl<'a> VariableLayers<'a> {
    /// Build the layers from task variables and the role defaults, highest
    /// precedence first.
    pub fn new(task_vars: &'a TaskVars, role_defaults: &'a Mapping) -> Self {
        Self {
            layers: vec![task_vars.as_mapping(), role_defaults],
        }
    }

    /// Resolve a dotted path in the first layer that defines its first segment.
    pub fn get_path(&self, path: &str) -> Result<&'a Value, PathNotFound> {
        let head = path.split('.').next().unwrap_or(path);
        let layer = self.layers.iter().copied().find(|layer| layer.contains_key(head)).ok_or_else(
            || PathNotFound {
                path: path.to_string(),
                segment: head.to_string(),
            },
        )?;
        lookup_mapping(layer, path)
    }
}
