//! Git operations for role installation.
//!
//! Roles that are distributed through a repository instead of an OCI
//! registry are installed with a shallow, single-branch clone of the
//! requested version. The system `git` binary is used rather than an
//! embedded implementation so that SSH agents, credential helpers and
//! `~/.gitconfig` behave the way they do for the user.
//!
//! All invocations go through [`GitCommand`], which captures output, logs
//! under the `git` tracing target and enforces a timeout.

pub mod command_builder;

pub use command_builder::GitCommand;

use anyhow::Result;
use std::path::Path;
use std::time::Duration;

/// Shallow-clone `url` at `version` into `target`.
///
/// `target` must not exist yet; callers check that before cloning.
pub async fn clone_role(url: &str, version: &str, target: &Path, timeout: Duration) -> Result<()> {
    tracing::info!("Cloning {} at {} into {}", url, version, target.display());
    GitCommand::shallow_clone(url, version, target)
        .with_context(format!("clone {url}"))
        .with_timeout(Some(timeout))
        .execute_success()
        .await
}
