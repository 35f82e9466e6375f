//! release-vector - metal-stack release vector resolver
//!
//! Resolves release vectors (YAML documents describing the component versions
//! of a metal-stack release) into a flat set of deployment variables, and
//! installs the companion Ansible roles a vector declares.
//!
//! # Architecture Overview
//!
//! A run starts from a list of vector specifications. Each specification names
//! a document (HTTP(S) URL, local file or `oci://` reference) and a variable
//! mapping from variable names to dotted paths inside that document:
//!
//! - the document is fetched, optionally verified with cosign, and parsed
//! - replacement rules rewrite selected string values
//! - declared roles are installed from OCI bundles or git
//! - mapped paths are resolved and nested vectors are followed recursively
//!
//! The first vector that sets a variable wins, and a variable the caller
//! already defined is never overwritten.
//!
//! # Core Modules
//!
//! ## Resolution
//! - [`action`] - Top-level actions and their Ansible-style results
//! - [`resolver`] - Recursive resolution of vector specifications
//! - [`document`] - Parsed documents and dotted path lookup
//! - [`vars`] - Task variables and layered mapping lookup
//!
//! ## Fetching
//! - [`loader`] - HTTP, file and OCI registry loading, tar+gzip extraction
//! - [`verify`] - Signature verification through cosign
//!
//! ## Roles
//! - [`installer`] - Role installation from OCI bundles and git repositories
//! - [`git`] - Git operations wrapper using the system git command
//!
//! ## Supporting Modules
//! - [`cache`] - Response cache of resolved facts
//! - [`cli`] - Command-line interface
//! - [`config`] - Global configuration (~/.release-vector/config.toml)
//! - [`constants`] - Media types, marker keys and defaults
//! - [`core`] - Error types and user-facing error reporting
//! - [`utils`] - File system helpers
//!
//! # Vector Specification
//!
//! ```yaml
//! - url: https://example.com/metal-stack/v0.15.0/release.yaml
//!   mapping:
//!     metal_api_image_tag: docker-images.metal-stack.control-plane.metal-api.tag
//!   replace:
//!     - key: name
//!       old: ghcr.io/
//!       new: mirror.example.com/
//!   nested:
//!     - url_path: vectors.gardener.url
//!       variable_mapping_path: gardener_release.mapping
//! ```
//!
//! # Command-Line Usage
//!
//! ```bash
//! release-vector resolve --vectors vectors.yaml --vars group_vars/all.yaml
//! release-vector releases --releases releases.yaml --vars group_vars/all.yaml
//! release-vector cache clean
//! ```

pub mod action;
pub mod cache;
pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod document;
pub mod resolver;
pub mod vars;

// Fetching
pub mod loader;
pub mod verify;

// Roles
pub mod git;
pub mod installer;

pub mod utils;

// test_utils module is available for both unit tests and integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
