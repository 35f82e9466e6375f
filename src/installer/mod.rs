//! Installing the companion roles a release vector declares.
//!
//! A release vector may carry a role dictionary (by default under
//! `ansible-roles`) of the form
//!
//! ```yaml
//! ansible-roles:
//!   ansible-common:
//!     repository: https://github.com/metal-stack/ansible-common.git
//!     oci: ghcr.io/metal-stack/ansible-common
//!     version: v0.5.0
//! ```
//!
//! Roles are installed below the first entry of the roles search path.
//! A role whose target directory already exists is left alone, so an
//! installation is never upgraded in place. OCI bundles take precedence
//! over git repositories when both are declared.

use anyhow::{Context, Result};
use serde::Serialize;
use serde_yaml::{Mapping, Value};
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::GIT_CLONE_TIMEOUT;
use crate::core::VectorError;
use crate::git;
use crate::loader::{HttpTransport, OciLoader, OciOptions, RenameFilter};
use crate::resolver::spec::{RoleAlias, find_alias};
use crate::vars::{TaskVars, scalar_to_string};
use crate::verify::SignatureVerifier;

/// Where a role comes from, as declared in the role dictionary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleSource {
    /// OCI repository of the role bundle, without tag
    pub oci: Option<String>,
    /// Git repository URL
    pub repository: Option<String>,
    /// Declared version (tag or branch)
    pub version: Option<String>,
}

impl RoleSource {
    /// Read a role dictionary entry. Unknown keys are ignored.
    pub fn from_value(value: &Value) -> Self {
        let text = |key: &str| value.get(key).and_then(scalar_to_string);
        Self {
            oci: text("oci"),
            repository: text("repository"),
            version: text("version"),
        }
    }
}

/// Why a role was not installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Neither `oci` nor `repository` was declared
    NoSource,
    /// The target directory already exists
    AlreadyInstalled,
}

/// Result of processing one role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RoleOutcome {
    Installed {
        name: String,
        version: String,
        source: String,
        path: PathBuf,
    },
    Skipped {
        name: String,
        reason: SkipReason,
    },
}

impl RoleOutcome {
    /// The effective role name.
    pub fn name(&self) -> &str {
        match self {
            Self::Installed {
                name,
                ..
            }
            | Self::Skipped {
                name,
                ..
            } => name,
        }
    }

    /// Whether the role was installed by this run.
    pub const fn is_installed(&self) -> bool {
        matches!(self, Self::Installed { .. })
    }
}

// OCI bundles take precedence over git
enum Origin<'s> {
    Oci(&'s str),
    Git(&'s str),
}

/// Installs roles from OCI bundles or git repositories.
pub struct RoleInstaller<'a> {
    transport: &'a dyn HttpTransport,
    verifier: &'a SignatureVerifier,
    task_vars: &'a TaskVars,
    roles_path: &'a [PathBuf],
    git_timeout: Duration,
}

impl<'a> RoleInstaller<'a> {
    /// Create an installer for the given roles search path.
    pub fn new(
        transport: &'a dyn HttpTransport,
        verifier: &'a SignatureVerifier,
        task_vars: &'a TaskVars,
        roles_path: &'a [PathBuf],
    ) -> Self {
        Self {
            transport,
            verifier,
            task_vars,
            roles_path,
            git_timeout: GIT_CLONE_TIMEOUT,
        }
    }

    /// Override the git clone timeout.
    #[must_use]
    pub const fn with_git_timeout(mut self, timeout: Duration) -> Self {
        self.git_timeout = timeout;
        self
    }

    /// Process every role of a role dictionary in document order.
    pub async fn install(
        &self,
        roles: &Mapping,
        aliases: &[RoleAlias],
        oci: &OciOptions,
    ) -> Result<Vec<RoleOutcome>> {
        let mut outcomes = Vec::with_capacity(roles.len());
        for (key, value) in roles {
            let key = key.as_str().ok_or_else(|| VectorError::ConfigError {
                message: format!("role names must be strings, got {key:?}"),
            })?;
            let source = RoleSource::from_value(value);
            outcomes.push(self.install_role(key, &source, aliases, oci).await?);
        }
        Ok(outcomes)
    }

    /// Install a single role.
    pub async fn install_role(
        &self,
        key: &str,
        source: &RoleSource,
        aliases: &[RoleAlias],
        oci: &OciOptions,
    ) -> Result<RoleOutcome> {
        let name = find_alias(aliases, key, source.repository.as_deref())
            .map_or_else(|| key.to_string(), |alias| alias.alias.clone());

        let origin = match (source.oci.as_deref(), source.repository.as_deref()) {
            (Some(repo), _) => Origin::Oci(repo),
            (None, Some(repository)) => Origin::Git(repository),
            (None, None) => {
                tracing::info!("{} has no oci ref nor repository defined, skipping", name);
                return Ok(RoleOutcome::Skipped {
                    name,
                    reason: SkipReason::NoSource,
                });
            }
        };

        let version = self.task_vars.version_override(&name).or_else(|| source.version.clone());
        let version = version.ok_or_else(|| VectorError::RoleVersionMissing {
            role: name.clone(),
        })?;

        let root = self.roles_path.first().ok_or(VectorError::RolesPathMissing)?;
        let target = root.join(&name);

        if target.exists() {
            tracing::info!("{} already installed in {}, skipping", name, target.display());
            return Ok(RoleOutcome::Skipped {
                name,
                reason: SkipReason::AlreadyInstalled,
            });
        }

        let installed_from = match origin {
            Origin::Oci(repo) => {
                let reference = format!("{repo}:{version}");
                tracing::info!("Installing {} ({}) from {} to {}", name, version, reference, target.display());

                let rename = (name != key).then(|| RenameFilter::new(key, &name));
                OciLoader::new(self.transport, self.verifier, oci)
                    .install_bundle(&reference, root, rename.as_ref())
                    .await
                    .with_context(|| format!("Failed to install role {name} from {reference}"))?;
                reference
            }
            Origin::Git(repository) => {
                tracing::info!("Installing {} ({}) from {} to {}", name, version, repository, target.display());

                git::clone_role(repository, &version, &target, self.git_timeout)
                    .await
                    .with_context(|| format!("error cloning git repository {repository}"))?;
                repository.to_string()
            }
        };

        Ok(RoleOutcome::Installed {
            name,
            version,
            source: installed_from,
            path: target,
        })
    }
}
