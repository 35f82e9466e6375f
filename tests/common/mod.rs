//! Common test utilities for release-vector integration tests
//!
//! [`TestProject`] owns a temporary directory with its own global
//! configuration, roles path and cache directory, so tests never touch the
//! user's environment.

// Not every helper is used by every test file
#![allow(dead_code)]

use anyhow::Result;
use assert_cmd::Command;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Convert a path to a file:// URL string
pub fn file_url(path: &Path) -> String {
    let path_str = path.display().to_string().replace('\\', "/");
    format!("file://{path_str}")
}

/// An isolated working area for running the binary.
pub struct TestProject {
    temp_dir: TempDir,
}

impl TestProject {
    pub fn new() -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let project = Self {
            temp_dir,
        };
        fs::create_dir_all(project.roles_dir())?;
        fs::create_dir_all(project.cache_dir())?;

        let config = format!(
            "roles_path = [\"{}\"]\ncache_dir = \"{}\"\nhttp_timeout_secs = 5\ngit_timeout_secs = 30\n",
            project.roles_dir().display(),
            project.cache_dir().display()
        );
        fs::write(project.config_path(), config)?;
        Ok(project)
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn config_path(&self) -> PathBuf {
        self.path().join("config.toml")
    }

    pub fn roles_dir(&self) -> PathBuf {
        self.path().join("roles")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.path().join("cache")
    }

    pub fn cache_file(&self) -> PathBuf {
        self.cache_dir().join("release-vector-cache.json")
    }

    /// Write a file below the project and return its path.
    pub fn write(&self, relative: &str, content: &str) -> Result<PathBuf> {
        let path = self.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, content)?;
        Ok(path)
    }

    /// The binary with this project's configuration and a clean environment.
    pub fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("release-vector").expect("binary is built");
        cmd.current_dir(self.path())
            .arg("--config")
            .arg(self.config_path())
            .env_remove("RUST_LOG")
            .env_remove("ANSIBLE_ROLES_PATH")
            .env_remove("RELEASE_VECTOR_CONFIG");
        cmd
    }

    /// Run the binary and parse stdout as the JSON result.
    pub fn run_json(&self, args: &[&str]) -> Result<(i32, serde_json::Value)> {
        let output = self.command().args(args).output()?;
        let code = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8(output.stdout)?;
        let json = serde_json::from_str(&stdout).map_err(|e| {
            anyhow::anyhow!(
                "stdout is not JSON ({e}):\n{stdout}\nstderr:\n{}",
                String::from_utf8_lossy(&output.stderr)
            )
        })?;
        Ok((code, json))
    }
}
