//! Loading the default variables of an installed role.
//!
//! A role's defaults live in `defaults/main.yml`, `defaults/main.yaml`, or,
//! for larger roles, in every YAML file of a `defaults/main/` directory,
//! merged in file name order.

use anyhow::{Context, Result};
use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};

use crate::core::VectorError;

/// Locate a role directory.
///
/// `role` is either an absolute path, a role name below one of the roles
/// search path roots, or a path relative to the working directory.
pub fn find_role_dir(role: &str, roles_path: &[PathBuf]) -> Result<PathBuf> {
    let candidate = Path::new(role);
    if candidate.is_absolute() {
        if candidate.is_dir() {
            return Ok(candidate.to_path_buf());
        }
    } else if let Some(dir) = roles_path.iter().map(|root| root.join(role)).find(|dir| dir.is_dir()) {
        return Ok(dir);
    } else if candidate.is_dir() {
        return Ok(candidate.to_path_buf());
    }

    Err(VectorError::ConfigError {
        message: format!("role {role} given in include_role_defaults was not found"),
    }
    .into())
}

/// Read the merged defaults of the role at `role_dir`.
///
/// A role without defaults yields an empty mapping.
pub fn read_role_defaults(role_dir: &Path) -> Result<Mapping> {
    let defaults_dir = role_dir.join("defaults");
    for file in ["main.yml", "main.yaml"] {
        let path = defaults_dir.join(file);
        if path.is_file() {
            return read_mapping(&path);
        }
    }

    let main_dir = defaults_dir.join("main");
    let mut merged = Mapping::new();
    if !main_dir.is_dir() {
        return Ok(merged);
    }

    let mut files: Vec<PathBuf> = std::fs::read_dir(&main_dir)
        .with_context(|| format!("Failed to read {}", main_dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path.extension().is_some_and(|ext| ext == "yml" || ext == "yaml")
        })
        .collect();
    files.sort();

    for file in files {
        for (key, value) in read_mapping(&file)? {
            merged.insert(key, value);
        }
    }
    Ok(merged)
}

fn read_mapping(path: &Path) -> Result<Mapping> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read role defaults {}", path.display()))?;
    let value: Value = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse role defaults {}", path.display()))?;
    match value {
        Value::Mapping(mapping) => Ok(mapping),
        Value::Null => Ok(Mapping::new()),
        _ => Err(VectorError::ConfigError {
            message: format!("role defaults {} must contain a mapping", path.display()),
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_find_role_in_roles_path() {
        let temp = tempfile::tempdir().unwrap();
        let first = temp.path().join("first");
        let second = temp.path().join("second");
        std::fs::create_dir_all(second.join("my-role")).unwrap();
        std::fs::create_dir_all(&first).unwrap();

        let dir = find_role_dir("my-role", &[first, second.clone()]).unwrap();
        assert_eq!(dir, second.join("my-role"));

        assert!(find_role_dir("missing-role", &[second]).is_err());
    }

    #[test]
    fn test_find_role_absolute() {
        let temp = tempfile::tempdir().unwrap();
        let role = temp.path().join("role");
        std::fs::create_dir_all(&role).unwrap();
        assert_eq!(find_role_dir(&role.display().to_string(), &[]).unwrap(), role);
    }

    #[test]
    fn test_read_defaults_main_yaml() {
        let temp = tempfile::tempdir().unwrap();
        write(&temp.path().join("defaults/main.yaml"), "a: 1\n");
        let defaults = read_role_defaults(temp.path()).unwrap();
        assert_eq!(defaults.get("a").and_then(Value::as_i64), Some(1));
    }

    #[test]
    fn test_read_defaults_directory_in_name_order() {
        let temp = tempfile::tempdir().unwrap();
        write(&temp.path().join("defaults/main/20-later.yml"), "a: later\nc: 3\n");
        write(&temp.path().join("defaults/main/10-first.yaml"), "a: first\nb: 2\n");
        write(&temp.path().join("defaults/main/README.md"), "ignored");

        let defaults = read_role_defaults(temp.path()).unwrap();
        assert_eq!(defaults.get("a").and_then(Value::as_str), Some("later"));
        assert!(defaults.contains_key("b"));
        assert!(defaults.contains_key("c"));
        assert_eq!(defaults.len(), 3);
    }

    #[test]
    fn test_role_without_defaults() {
        let temp = tempfile::tempdir().unwrap();
        assert!(read_role_defaults(temp.path()).unwrap().is_empty());
    }
}
