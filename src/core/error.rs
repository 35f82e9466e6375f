//! Error handling for release-vector
//!
//! This module provides the error types and user-friendly error reporting for
//! release vector resolution. The error system is designed around two principles:
//! 1. **Strongly-typed errors** for precise error handling in code
//! 2. **User-friendly messages** with actionable suggestions for CLI users
//!
//! # Architecture
//!
//! - [`VectorError`] - Enumerated error types for every fatal failure
//! - [`ErrorContext`] - Wrapper that adds user-friendly messages and suggestions
//!
//! # Error Categories
//!
//! - **Configuration**: [`VectorError::ConfigError`], [`VectorError::InvalidSpec`],
//!   [`VectorError::MissingMapping`], [`VectorError::MappingNotFound`]
//! - **Transport and parsing**: [`VectorError::NetworkError`], [`VectorError::HttpStatus`],
//!   [`VectorError::DocumentParseError`]
//! - **OCI**: [`VectorError::InvalidOciReference`], [`VectorError::OciLayerNotFound`],
//!   [`VectorError::ArchiveError`], [`VectorError::ChecksumMismatch`]
//! - **Structure**: [`VectorError::PathNotFound`], [`VectorError::CyclicReference`]
//! - **Verification**: [`VectorError::VerificationToolNotFound`],
//!   [`VectorError::VerificationFailed`]
//! - **Role installation**: [`VectorError::RoleVersionMissing`],
//!   [`VectorError::RolesPathMissing`], [`VectorError::GitCloneFailed`]
//!
//! A path that is missing while evaluating a variable mapping is *not* an error;
//! it is reported as a [`crate::document::PathNotFound`] and skipped.
//!
//! # Examples
//!
//! ```rust,no_run
//! use release_vector::core::{VectorError, ErrorContext};
//!
//! let context = ErrorContext::new(VectorError::RolesPathMissing)
//!     .with_suggestion("Set roles_path in the configuration file")
//!     .with_details("Roles are installed below the first roles search path entry");
//!
//! context.display();
//! ```

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// The main error type for release vector resolution.
///
/// Every variant is fatal for the resolution branch that raised it and
/// propagates to the top-level action, which reports it as a failed result.
#[derive(Error, Debug)]
pub enum VectorError {
    /// Configuration error
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Description of the configuration error
        message: String,
    },

    /// A vector specification could not be understood
    ///
    /// Raised for unknown parameters, malformed replacement rules and other
    /// shape errors in the task arguments.
    #[error("Invalid vector specification for {url}: {reason}")]
    InvalidSpec {
        /// URL (or placeholder) of the specification
        url: String,
        /// What is wrong with it
        reason: String,
    },

    /// Neither `mapping` nor `variable_mapping_path` was given
    #[error("variable_mapping_path or mapping is required for {url}")]
    MissingMapping {
        /// URL of the vector without a mapping
        url: String,
    },

    /// The mapping path could not be found in any variable layer
    #[error("no mapping found in any variables at {path}")]
    MappingNotFound {
        /// The mapping path that was looked up
        path: String,
    },

    /// A structurally required path is missing from a document
    #[error("path \"{path}\" does not exist in {url}")]
    PathNotFound {
        /// Dotted path that was looked up
        path: String,
        /// URL of the document
        url: String,
    },

    /// A nested reference points back to one of its ancestors
    #[error("cyclic reference to {url} (chain: {chain})")]
    CyclicReference {
        /// URL that was referenced again
        url: String,
        /// Ancestor chain joined with " -> "
        chain: String,
    },

    /// Network error
    #[error("Network error: {operation}")]
    NetworkError {
        /// The network operation that failed
        operation: String,
        /// Reason for the network failure
        reason: String,
    },

    /// A request returned a non-success status
    #[error("Request to {url} failed with status {status}")]
    HttpStatus {
        /// Requested URL
        url: String,
        /// HTTP status code
        status: u16,
    },

    /// A fetched document is not valid YAML
    #[error("Failed to parse document from {url}: {reason}")]
    DocumentParseError {
        /// URL of the document
        url: String,
        /// Parser message
        reason: String,
    },

    /// An OCI reference could not be parsed
    #[error("Invalid OCI reference '{reference}': {reason}")]
    InvalidOciReference {
        /// The reference as given
        reference: String,
        /// What is wrong with it
        reason: String,
    },

    /// The manifest has no layer of the expected media type
    #[error("no layer with media type {media_type} found in {reference}")]
    OciLayerNotFound {
        /// The OCI reference
        reference: String,
        /// Expected media type
        media_type: String,
    },

    /// A layer blob could not be unpacked
    #[error("error extracting tar from oci layer of {reference}: {reason}")]
    ArchiveError {
        /// The OCI reference
        reference: String,
        /// Reason for the failure
        reason: String,
    },

    /// The requested member is not part of the archive
    #[error("member '{member}' not found in archive of {reference}")]
    ArchiveMemberNotFound {
        /// Name of the member
        member: String,
        /// The OCI reference
        reference: String,
    },

    /// Checksum mismatch
    #[error("Checksum mismatch for blob of {reference}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// The OCI reference
        reference: String,
        /// Digest declared by the manifest
        expected: String,
        /// Digest computed from the downloaded bytes
        actual: String,
    },

    /// Signature verification tool missing
    #[error("Signature verification tool '{tool}' is not installed or not found in PATH")]
    VerificationToolNotFound {
        /// Name of the tool
        tool: String,
    },

    /// Signature verification failed
    #[error("Signature verification failed for {reference}")]
    VerificationFailed {
        /// The verified reference
        reference: String,
        /// Error output of the verification tool
        stderr: String,
    },

    /// Role without a version
    #[error("no version specified for role {role}")]
    RoleVersionMissing {
        /// Effective role name
        role: String,
    },

    /// No roles search path configured
    #[error("no default roles path configured")]
    RolesPathMissing,

    /// Git operation failed during execution
    #[error("Git operation failed: {operation}")]
    GitCommandError {
        /// The git operation that failed
        operation: String,
        /// The error output from the git command
        stderr: String,
    },

    /// Git executable not found in PATH
    #[error("Git is not installed or not found in PATH")]
    GitNotFound,

    /// Git repository clone failed
    #[error("error cloning git repository {url}: {reason}")]
    GitCloneFailed {
        /// The repository URL that failed to clone
        url: String,
        /// The reason for the clone failure
        reason: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Other error
    #[error("{message}")]
    Other {
        /// Generic error message
        message: String,
    },
}

impl Clone for VectorError {
    fn clone(&self) -> Self {
        match self {
            Self::ConfigError {
                message,
            } => Self::ConfigError {
                message: message.clone(),
            },
            Self::InvalidSpec {
                url,
                reason,
            } => Self::InvalidSpec {
                url: url.clone(),
                reason: reason.clone(),
            },
            Self::MissingMapping {
                url,
            } => Self::MissingMapping {
                url: url.clone(),
            },
            Self::MappingNotFound {
                path,
            } => Self::MappingNotFound {
                path: path.clone(),
            },
            Self::PathNotFound {
                path,
                url,
            } => Self::PathNotFound {
                path: path.clone(),
                url: url.clone(),
            },
            Self::CyclicReference {
                url,
                chain,
            } => Self::CyclicReference {
                url: url.clone(),
                chain: chain.clone(),
            },
            Self::NetworkError {
                operation,
                reason,
            } => Self::NetworkError {
                operation: operation.clone(),
                reason: reason.clone(),
            },
            Self::HttpStatus {
                url,
                status,
            } => Self::HttpStatus {
                url: url.clone(),
                status: *status,
            },
            Self::DocumentParseError {
                url,
                reason,
            } => Self::DocumentParseError {
                url: url.clone(),
                reason: reason.clone(),
            },
            Self::InvalidOciReference {
                reference,
                reason,
            } => Self::InvalidOciReference {
                reference: reference.clone(),
                reason: reason.clone(),
            },
            Self::OciLayerNotFound {
                reference,
                media_type,
            } => Self::OciLayerNotFound {
                reference: reference.clone(),
                media_type: media_type.clone(),
            },
            Self::ArchiveError {
                reference,
                reason,
            } => Self::ArchiveError {
                reference: reference.clone(),
                reason: reason.clone(),
            },
            Self::ArchiveMemberNotFound {
                member,
                reference,
            } => Self::ArchiveMemberNotFound {
                member: member.clone(),
                reference: reference.clone(),
            },
            Self::ChecksumMismatch {
                reference,
                expected,
                actual,
            } => Self::ChecksumMismatch {
                reference: reference.clone(),
                expected: expected.clone(),
                actual: actual.clone(),
            },
            Self::VerificationToolNotFound {
                tool,
            } => Self::VerificationToolNotFound {
                tool: tool.clone(),
            },
            Self::VerificationFailed {
                reference,
                stderr,
            } => Self::VerificationFailed {
                reference: reference.clone(),
                stderr: stderr.clone(),
            },
            Self::RoleVersionMissing {
                role,
            } => Self::RoleVersionMissing {
                role: role.clone(),
            },
            Self::RolesPathMissing => Self::RolesPathMissing,
            Self::GitCommandError {
                operation,
                stderr,
            } => Self::GitCommandError {
                operation: operation.clone(),
                stderr: stderr.clone(),
            },
            Self::GitNotFound => Self::GitNotFound,
            Self::GitCloneFailed {
                url,
                reason,
            } => Self::GitCloneFailed {
                url: url.clone(),
                reason: reason.clone(),
            },
            // io::Error is not Clone, carry kind and message over
            Self::IoError(e) => Self::IoError(std::io::Error::new(e.kind(), e.to_string())),
            Self::Other {
                message,
            } => Self::Other {
                message: message.clone(),
            },
        }
    }
}

/// Error context wrapper that provides user-friendly error information
///
/// Wraps a [`VectorError`] and adds an optional suggestion (displayed in
/// green) and optional details (displayed in yellow).
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error
    pub error: VectorError,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new error context without suggestion or details.
    #[must_use]
    pub const fn new(error: VectorError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add additional details explaining the error
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Display the error context to stderr with terminal colors
    ///
    /// - Error message: Red and bold
    /// - Details: Yellow
    /// - Suggestion: Green
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Render the full cause chain of an error, one cause per line.
///
/// This is the `error` field of a failed action result.
#[must_use]
pub fn error_chain(error: &anyhow::Error) -> String {
    let mut message = error.to_string();
    let chain: Vec<String> = error.chain().skip(1).map(std::string::ToString::to_string).collect();

    if !chain.is_empty() {
        message.push_str("\n\nCaused by:");
        for (i, cause) in chain.iter().enumerate() {
            message.push_str(&format!("\n  {}: {}", i + 1, cause));
        }
    }

    message
}

/// Convert any error into a user-friendly [`ErrorContext`].
///
/// The first [`VectorError`] found in the cause chain determines the
/// suggestion; I/O errors get generic file-system advice; anything else is
/// wrapped as [`VectorError::Other`] with the full chain.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(vector_error) = error.chain().find_map(|cause| cause.downcast_ref::<VectorError>())
    {
        let mut ctx = create_error_context(vector_error.clone());
        // Keep the outer context visible when the typed error is buried
        if ctx.details.is_none() && error.to_string() != ctx.error.to_string() {
            ctx.details = Some(error.to_string());
        }
        return ctx;
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>() {
        match io_error.kind() {
            std::io::ErrorKind::PermissionDenied => {
                return ErrorContext::new(VectorError::Other {
                    message: error_chain(&error),
                })
                .with_suggestion("Check the permissions of the roles path and the cache directory");
            }
            std::io::ErrorKind::NotFound => {
                return ErrorContext::new(VectorError::Other {
                    message: error_chain(&error),
                })
                .with_suggestion("Check that the file or directory exists and the path is correct");
            }
            _ => {}
        }
    }

    ErrorContext::new(VectorError::Other {
        message: error_chain(&error),
    })
}

fn create_error_context(error: VectorError) -> ErrorContext {
    match &error {
        VectorError::GitNotFound => ErrorContext::new(error)
            .with_suggestion("Install git from https://git-scm.com/ or your package manager (e.g., 'apt install git')")
            .with_details("Roles declared with a repository are cloned with the system git command"),

        VectorError::GitCloneFailed { url, .. } => {
            let suggestion = format!(
                "Verify the repository URL is correct: {url}. The role version must be a branch or tag"
            );
            ErrorContext::new(error)
                .with_suggestion(suggestion)
                .with_details("Roles are cloned with depth 1 at the declared version")
        }

        VectorError::VerificationToolNotFound { tool } => {
            let suggestion = format!(
                "Install {tool} (https://docs.sigstore.dev/cosign/system_config/installation/) or set cosign_binary in the configuration"
            );
            ErrorContext::new(error)
                .with_suggestion(suggestion)
                .with_details("Signature verification was requested through oci_cosign_verify_* options")
        }

        VectorError::VerificationFailed { stderr, .. } => {
            let details = stderr.trim().to_string();
            ErrorContext::new(error)
                .with_suggestion("Check the public key or the certificate identity and OIDC issuer")
                .with_details(details)
        }

        VectorError::RolesPathMissing => ErrorContext::new(error)
            .with_suggestion("Set roles_path in the configuration file or export ANSIBLE_ROLES_PATH")
            .with_details("Roles are installed below the first roles search path entry"),

        VectorError::RoleVersionMissing { role } => {
            let suggestion = format!(
                "Declare a version for {role} in the release vector or set the {}_version variable",
                role.replace('-', "_").to_lowercase()
            );
            ErrorContext::new(error).with_suggestion(suggestion)
        }

        VectorError::OciLayerNotFound { .. } => ErrorContext::new(error)
            .with_suggestion("Check that the reference points to a release vector or role bundle artifact")
            .with_details("Layers are selected by their media type"),

        VectorError::InvalidOciReference { .. } => ErrorContext::new(error)
            .with_suggestion("Use the form oci://registry/namespace/repository:tag"),

        VectorError::HttpStatus { status, .. } if *status == 401 || *status == 403 => {
            ErrorContext::new(error)
                .with_suggestion("Provide oci_registry_username and oci_registry_password for private registries")
        }

        VectorError::NetworkError { .. } | VectorError::HttpStatus { .. } => ErrorContext::new(error)
            .with_suggestion("Check the URL and your network connection"),

        VectorError::InvalidSpec { .. } | VectorError::MissingMapping { .. } => {
            ErrorContext::new(error).with_suggestion(
                "Check the vector specification; supported keys are url, variable_mapping_path, mapping, replace, nested, install_roles, ansible_roles_path, role_aliases, include_role_defaults (or from_role_defaults), meta_var and the oci_* options",
            )
        }

        VectorError::CyclicReference { .. } => ErrorContext::new(error)
            .with_suggestion("Remove the nested entry that points back to an ancestor document"),

        _ => ErrorContext::new(error),
    }
}
