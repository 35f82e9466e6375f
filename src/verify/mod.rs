//! Signature verification of OCI artifacts with `cosign`.
//!
//! Verification runs before any content of an artifact is fetched. It is
//! active when a public key is configured, or when both a certificate
//! identity and an OIDC issuer are configured for keyless verification.
//! The `cosign` binary is an external tool; it is located on `PATH` (or
//! through the configured binary name) at the time of verification.

use anyhow::{Context, Result};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

use crate::constants::COSIGN_TIMEOUT;
use crate::core::VectorError;
use crate::loader::oci::OciReference;

/// Verification settings of a vector specification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CosignOptions {
    /// Public key (path or key reference) for key-based verification
    pub key: Option<String>,
    /// Expected certificate identity for keyless verification
    pub certificate_identity: Option<String>,
    /// Expected certificate OIDC issuer for keyless verification
    pub certificate_oidc_issuer: Option<String>,
}

/// How an artifact is verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyMode {
    /// `cosign verify --key <key>`
    Key(String),
    /// `cosign verify --certificate-identity <identity> --certificate-oidc-issuer <issuer>`
    Keyless {
        /// Certificate identity
        identity: String,
        /// OIDC issuer
        issuer: String,
    },
}

impl CosignOptions {
    /// The verification mode, `None` when verification is disabled.
    ///
    /// A key takes precedence over keyless settings. Setting only one of
    /// identity and issuer is a configuration error.
    pub fn mode(&self) -> Result<Option<VerifyMode>> {
        if let Some(key) = self.key.as_deref().filter(|k| !k.is_empty()) {
            return Ok(Some(VerifyMode::Key(key.to_string())));
        }

        let identity = self.certificate_identity.as_deref().filter(|v| !v.is_empty());
        let issuer = self.certificate_oidc_issuer.as_deref().filter(|v| !v.is_empty());
        match (identity, issuer) {
            (Some(identity), Some(issuer)) => Ok(Some(VerifyMode::Keyless {
                identity: identity.to_string(),
                issuer: issuer.to_string(),
            })),
            (None, None) => Ok(None),
            _ => Err(VectorError::ConfigError {
                message: "when verifying keyless, both oci_cosign_verify_certificate_identity and oci_cosign_verify_certificate_oidc_issuer must be set".to_string(),
            }
            .into()),
        }
    }

    /// Fill unset fields from `parent`.
    #[must_use]
    pub fn inherit(mut self, parent: &Self) -> Self {
        if self.key.is_none() {
            self.key.clone_from(&parent.key);
        }
        if self.certificate_identity.is_none() {
            self.certificate_identity.clone_from(&parent.certificate_identity);
        }
        if self.certificate_oidc_issuer.is_none() {
            self.certificate_oidc_issuer.clone_from(&parent.certificate_oidc_issuer);
        }
        self
    }
}

/// Runs `cosign` against OCI references.
#[derive(Debug, Clone)]
pub struct SignatureVerifier {
    binary: String,
    timeout: Duration,
}

impl Default for SignatureVerifier {
    fn default() -> Self {
        Self::new("cosign")
    }
}

impl SignatureVerifier {
    /// Use the given binary name or path.
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            timeout: COSIGN_TIMEOUT,
        }
    }

    /// Verify `reference` if `options` enable verification.
    ///
    /// With `credentials`, `cosign login` runs first so that cosign can read
    /// signatures from a private registry.
    pub async fn verify(
        &self,
        reference: &OciReference,
        options: &CosignOptions,
        credentials: Option<(&str, &str)>,
    ) -> Result<()> {
        let Some(mode) = options.mode()? else {
            return Ok(());
        };

        let binary = which::which(&self.binary).map_err(|_| VectorError::VerificationToolNotFound {
            tool: self.binary.clone(),
        })?;

        if let Some((username, password)) = credentials {
            let args = login_args(reference, username, password);
            self.run(&binary, &args, reference).await?;
        }

        let args = verify_args(reference, &mode);
        tracing::info!(target: "oci", "Verifying signature of {}", reference);
        self.run(&binary, &args, reference).await
    }

    async fn run(&self, binary: &std::path::Path, args: &[String], reference: &OciReference) -> Result<()> {
        // Never log a password
        let printable = if args.first().map(String::as_str) == Some("login") {
            "login".to_string()
        } else {
            args.join(" ")
        };
        tracing::debug!(target: "oci", "Executing: {} {}", self.binary, printable);

        let output = Command::new(binary)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();
        let output = timeout(self.timeout, output)
            .await
            .map_err(|_| VectorError::VerificationFailed {
                reference: reference.to_string(),
                stderr: format!("{} timed out after {} seconds", self.binary, self.timeout.as_secs()),
            })?
            .with_context(|| format!("Failed to execute {}", self.binary))?;

        if !output.status.success() {
            return Err(VectorError::VerificationFailed {
                reference: reference.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
            .into());
        }
        Ok(())
    }
}

fn insecure_flag(reference: &OciReference) -> Option<String> {
    (reference.scheme == "http").then(|| "--allow-insecure-registry".to_string())
}

/// Arguments of `cosign login`.
pub fn login_args(reference: &OciReference, username: &str, password: &str) -> Vec<String> {
    let mut args = vec![
        "login".to_string(),
        reference.host.clone(),
        "-u".to_string(),
        username.to_string(),
        "-p".to_string(),
        password.to_string(),
    ];
    args.extend(insecure_flag(reference));
    args
}

/// Arguments of `cosign verify`.
pub fn verify_args(reference: &OciReference, mode: &VerifyMode) -> Vec<String> {
    let mut args = vec!["verify".to_string()];
    match mode {
        VerifyMode::Key(key) => {
            args.push("--key".to_string());
            args.push(key.clone());
        }
        VerifyMode::Keyless {
            identity,
            issuer,
        } => {
            args.push("--certificate-identity".to_string());
            args.push(identity.clone());
            args.push("--certificate-oidc-issuer".to_string());
            args.push(issuer.clone());
        }
    }
    args.extend(insecure_flag(reference));
    args.push(reference.to_string());
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(scheme: &str) -> OciReference {
        OciReference::parse("oci://registry.example:5000/metal-stack/releases:v0.1.0", scheme).unwrap()
    }

    #[test]
    fn test_mode_disabled_by_default() {
        assert_eq!(CosignOptions::default().mode().unwrap(), None);
    }

    #[test]
    fn test_mode_key_wins() {
        let options = CosignOptions {
            key: Some("cosign.pub".to_string()),
            certificate_identity: Some("me".to_string()),
            certificate_oidc_issuer: None,
        };
        assert_eq!(options.mode().unwrap(), Some(VerifyMode::Key("cosign.pub".to_string())));
    }

    #[test]
    fn test_mode_keyless_requires_both() {
        let options = CosignOptions {
            certificate_identity: Some("me@example.com".to_string()),
            ..CosignOptions::default()
        };
        let err = options.mode().unwrap_err();
        assert!(matches!(err.downcast_ref::<VectorError>(), Some(VectorError::ConfigError { .. })));

        let options = CosignOptions {
            certificate_identity: Some("me@example.com".to_string()),
            certificate_oidc_issuer: Some("https://accounts.example".to_string()),
            ..CosignOptions::default()
        };
        assert!(matches!(options.mode().unwrap(), Some(VerifyMode::Keyless { .. })));
    }

    #[test]
    fn test_verify_args_key() {
        let args = verify_args(&reference("https"), &VerifyMode::Key("k.pub".to_string()));
        assert_eq!(
            args,
            vec!["verify", "--key", "k.pub", "registry.example:5000/metal-stack/releases:v0.1.0"]
        );
    }

    #[test]
    fn test_verify_args_keyless_insecure() {
        let mode = VerifyMode::Keyless {
            identity: "id".to_string(),
            issuer: "iss".to_string(),
        };
        let args = verify_args(&reference("http"), &mode);
        assert_eq!(
            args,
            vec![
                "verify",
                "--certificate-identity",
                "id",
                "--certificate-oidc-issuer",
                "iss",
                "--allow-insecure-registry",
                "registry.example:5000/metal-stack/releases:v0.1.0",
            ]
        );
    }

    #[test]
    fn test_login_args() {
        let args = login_args(&reference("https"), "user", "secret");
        assert_eq!(args, vec!["login", "registry.example:5000", "-u", "user", "-p", "secret"]);
    }

    #[test]
    fn test_inherit_keeps_own_values() {
        let parent = CosignOptions {
            key: Some("parent.pub".to_string()),
            certificate_identity: Some("parent".to_string()),
            certificate_oidc_issuer: Some("issuer".to_string()),
        };
        let child = CosignOptions {
            key: Some("child.pub".to_string()),
            ..CosignOptions::default()
        }
        .inherit(&parent);
        assert_eq!(child.key.as_deref(), Some("child.pub"));
        assert_eq!(child.certificate_identity.as_deref(), Some("parent"));
    }

    #[tokio::test]
    async fn test_disabled_verification_needs_no_tool() {
        let verifier = SignatureVerifier::new("definitely-not-installed-cosign");
        verifier.verify(&reference("https"), &CosignOptions::default(), None).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_tool_is_reported() {
        let verifier = SignatureVerifier::new("definitely-not-installed-cosign");
        let options = CosignOptions {
            key: Some("k.pub".to_string()),
            ..CosignOptions::default()
        };
        let err = verifier.verify(&reference("https"), &options, None).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<VectorError>(),
            Some(VectorError::VerificationToolNotFound { tool }) if tool == "definitely-not-installed-cosign"
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_verification_carries_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let cosign = crate::test_utils::fake_tool(
            dir.path(),
            "cosign",
            "echo 'Error: no matching signatures' >&2\nexit 1",
        );
        let verifier = SignatureVerifier::new(cosign.display().to_string());
        let options = CosignOptions {
            key: Some("k.pub".to_string()),
            ..CosignOptions::default()
        };

        let err = verifier.verify(&reference("https"), &options, None).await.unwrap_err();
        match err.downcast_ref::<VectorError>() {
            Some(VectorError::VerificationFailed {
                reference,
                stderr,
            }) => {
                assert_eq!(reference, "registry.example:5000/metal-stack/releases:v0.1.0");
                assert_eq!(stderr, "Error: no matching signatures");
            }
            other => panic!("expected VerificationFailed, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_login_runs_before_verify() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("calls.log");
        let cosign = crate::test_utils::fake_tool(
            dir.path(),
            "cosign",
            &format!("echo \"$1 $2\" >> '{}'", log.display()),
        );
        let verifier = SignatureVerifier::new(cosign.display().to_string());
        let options = CosignOptions {
            key: Some("k.pub".to_string()),
            ..CosignOptions::default()
        };

        verifier.verify(&reference("https"), &options, Some(("robot", "secret"))).await.unwrap();

        let calls = std::fs::read_to_string(&log).unwrap();
        assert_eq!(calls.lines().collect::<Vec<_>>(), vec!["login registry.example:5000", "verify --key"]);
    }
}
