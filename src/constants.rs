//! Global constants used throughout the release-vector codebase.
//!
//! This module contains media types, reserved variable names, file names and
//! timeout durations that are used across multiple modules. Defining them
//! centrally makes magic strings more discoverable.

use std::time::Duration;

/// URL prefix that routes a reference to the OCI loader.
pub const OCI_PREFIX: &str = "oci://";

/// Layer media type of a release vector artifact.
pub const RELEASE_VECTOR_MEDIA_TYPE: &str =
    "application/vnd.metal-stack.release-vector.v1.tar+gzip";

/// Layer media type of an ansible-role bundle artifact.
pub const ANSIBLE_ROLE_MEDIA_TYPE: &str = "application/vnd.metal-stack.ansible-role.v1.tar+gzip";

/// Accept header sent when fetching an OCI manifest.
pub const OCI_MANIFEST_MEDIA_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";

/// Member of the release vector archive that holds the document.
pub const DEFAULT_TAR_MEMBER: &str = "release.yaml";

/// Default URL scheme used to talk to OCI registries.
pub const DEFAULT_OCI_SCHEME: &str = "https";

/// Default document path of the role dictionary inside a release vector.
pub const DEFAULT_ROLES_PATH_IN_DOCUMENT: &str = "ansible-roles";

/// Name of the response cache file inside the cache directory.
pub const CACHE_FILE_NAME: &str = "release-vector-cache.json";

/// Fact set once release vectors have been resolved.
pub const VECTORS_RESOLVED_MARKER: &str = "_release_vectors_already_resolved";

/// Fact set once templated releases have been resolved.
pub const RELEASES_RESOLVED_MARKER: &str = "_releases_already_resolved";

/// Task variable holding the list of release vectors.
pub const VECTORS_VAR: &str = "release_vectors";

/// Task variable toggling the response cache.
pub const CACHE_VAR: &str = "release_vector_cache";

/// Task variable toggling the already-resolved short circuit.
pub const SMART_VAR: &str = "release_vector_smart";

/// Task variable holding default replacement rules.
pub const REPLACEMENTS_VAR: &str = "release_vector_replacements";

/// Task variable toggling role installation.
pub const INSTALL_ROLES_VAR: &str = "release_vector_install_roles";

/// Task variable holding the list of templated releases.
pub const RELEASES_VAR: &str = "setup_release";

/// Task variable toggling the short circuit of templated releases.
pub const RELEASES_SMART_VAR: &str = "setup_release_smart";

/// Sub-mapping of the task variables holding previously gathered facts.
pub const FACTS_VAR: &str = "ansible_facts";

/// Timeout for HTTP requests (60 seconds).
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// Timeout for Git clone operations (120 seconds).
///
/// Shallow clones of role repositories are usually quick, but slow mirrors
/// should not fail a run.
pub const GIT_CLONE_TIMEOUT: Duration = Duration::from_secs(120);

/// Timeout for cosign invocations (120 seconds).
///
/// Keyless verification talks to the transparency log and may be slow.
pub const COSIGN_TIMEOUT: Duration = Duration::from_secs(120);

/// Roles search path used when neither configuration nor environment sets one.
pub const DEFAULT_ROLES_PATH: &[&str] =
    &["~/.ansible/roles", "/usr/share/ansible/roles", "/etc/ansible/roles"];

/// Environment variable that overrides the roles search path (colon separated).
pub const ROLES_PATH_ENV: &str = "ANSIBLE_ROLES_PATH";

/// Environment variable that overrides the configuration file location.
pub const CONFIG_PATH_ENV: &str = "RELEASE_VECTOR_CONFIG";
