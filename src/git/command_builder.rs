//! Type-safe Git command builder for consistent command execution
//!
//! This module provides a fluent API for building and executing Git commands
//! with timeouts, captured output and consistent error mapping.

use anyhow::{Context, Result};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

use crate::constants::GIT_CLONE_TIMEOUT;
use crate::core::VectorError;

// Platform-specific Git executable name
const fn git_binary() -> &'static str {
    if cfg!(windows) {
        "git.exe"
    } else {
        "git"
    }
}

/// Builder for constructing and executing Git commands.
///
/// # Examples
///
/// ```rust,ignore
/// use release_vector::git::GitCommand;
///
/// # async fn example() -> anyhow::Result<()> {
/// GitCommand::shallow_clone("https://github.com/metal-stack/ansible-common.git", "v0.5.0", "/tmp/roles/ansible-common")
///     .with_context("installing ansible-common")
///     .execute_success()
///     .await?;
/// # Ok(())
/// # }
/// ```
///
/// # Default Configuration
///
/// - **Timeout**: 2 minutes
/// - **Output capture**: Enabled
/// - **Environment**: Inherits from parent process, terminal prompts disabled
pub struct GitCommand {
    /// Command arguments to pass to Git (e.g., ["clone", "url", "path"])
    args: Vec<String>,

    /// Environment variables to set for the Git process
    env_vars: Vec<(String, String)>,

    /// Maximum duration to wait for command completion (None = no timeout)
    timeout_duration: Option<Duration>,

    /// Optional context string for log lines
    context: Option<String>,

    /// For clone commands, store the URL for better error messages
    clone_url: Option<String>,
}

impl Default for GitCommand {
    fn default() -> Self {
        Self {
            args: Vec::new(),
            // A credential prompt would block the run forever
            env_vars: vec![("GIT_TERMINAL_PROMPT".to_string(), "0".to_string())],
            timeout_duration: Some(GIT_CLONE_TIMEOUT),
            context: None,
            clone_url: None,
        }
    }
}

impl GitCommand {
    /// Creates a new Git command builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets or clears the timeout.
    pub const fn with_timeout(mut self, duration: Option<Duration>) -> Self {
        self.timeout_duration = duration;
        self
    }

    /// Adds a context label to log lines.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Execute the command and return the output
    pub async fn execute(self) -> Result<GitCommandOutput> {
        let start = std::time::Instant::now();
        let git_command = git_binary();
        let full_args = self.args.clone();
        let label = self.context.clone().unwrap_or_else(|| "git".to_string());

        if which::which(git_command).is_err() {
            return Err(VectorError::GitNotFound.into());
        }

        let mut cmd = Command::new(git_command);
        cmd.args(&full_args);
        for (key, value) in &self.env_vars {
            cmd.env(key, value);
        }
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        tracing::debug!(target: "git", "({}) Executing command: {} {}", label, git_command, full_args.join(" "));

        let output_future = cmd.output();
        let output = if let Some(duration) = self.timeout_duration {
            if let Ok(result) = timeout(duration, output_future).await {
                result.with_context(|| format!("Failed to execute git {}", full_args.join(" ")))?
            } else {
                tracing::warn!(
                    target: "git",
                    "Command timed out after {} seconds: git {}",
                    duration.as_secs(),
                    full_args.join(" ")
                );
                return Err(VectorError::GitCommandError {
                    operation: Self::operation(&full_args),
                    stderr: format!(
                        "Git command timed out after {} seconds. Try running it manually: git {}",
                        duration.as_secs(),
                        full_args.join(" ")
                    ),
                }
                .into());
            }
        } else {
            output_future
                .await
                .with_context(|| format!("Failed to execute git {}", full_args.join(" ")))?
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            tracing::debug!(target: "git", "({}) Command failed with exit code: {:?}", label, output.status.code());

            let reason = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            let error = match self.clone_url {
                Some(url) => VectorError::GitCloneFailed {
                    url,
                    reason,
                },
                None => VectorError::GitCommandError {
                    operation: Self::operation(&full_args),
                    stderr: reason,
                },
            };
            return Err(error.into());
        }

        if !stdout.is_empty() {
            tracing::debug!(target: "git", "({}) {}", label, stdout.trim());
        }
        if !stderr.is_empty() {
            tracing::debug!(target: "git", "({}) {}", label, stderr.trim());
        }

        let elapsed = start.elapsed();
        if elapsed.as_secs() > 1 {
            tracing::info!(target: "git::perf", "({}) Git {} took {:.2}s", label, Self::operation(&full_args), elapsed.as_secs_f64());
        }

        Ok(GitCommandOutput {
            stdout,
            stderr,
        })
    }

    /// Execute the command and check for success
    pub async fn execute_success(self) -> Result<()> {
        self.execute().await?;
        Ok(())
    }

    // The git subcommand
    fn operation(full_args: &[String]) -> String {
        full_args.first().cloned().unwrap_or_else(|| "unknown".to_string())
    }
}

/// Output from a Git command
pub struct GitCommandOutput {
    /// Standard output from the Git command
    pub stdout: String,
    /// Standard error output from the Git command
    pub stderr: String,
}

impl GitCommand {
    /// Create a shallow clone of a single branch or tag.
    ///
    /// `git clone --depth 1 --branch <reference> <url> <target>`
    pub fn shallow_clone(url: &str, reference: &str, target: impl AsRef<Path>) -> Self {
        let mut cmd = Self::new().args(["clone", "--depth", "1", "--branch", reference]);
        cmd.args.push(url.to_string());
        cmd.args.push(target.as_ref().display().to_string());
        cmd.clone_url = Some(url.to_string());
        cmd
    }
}
