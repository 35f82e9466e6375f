//! Core types for release-vector
//!
//! This module holds the error types shared by every other module:
//! - [`VectorError`] - Enumerated error types covering all fatal failure modes
//! - [`ErrorContext`] - User-friendly error wrapper with suggestions and details
//! - [`user_friendly_error`] - Convert any error into an [`ErrorContext`]
//! - [`error_chain`] - Render an error and its causes as one message
//!
//! # Error First Design
//!
//! Every operation that can fail returns an [`anyhow::Result`] whose root cause
//! is, where it matters, a [`VectorError`]. Outcomes that are expected to happen
//! during normal operation (a mapped path missing from a document, a role that is
//! already installed) are modelled as plain values instead, so callers cannot
//! confuse a skip with a failure.
//!
//! # Examples
//!
//! ```rust,no_run
//! use release_vector::core::{VectorError, user_friendly_error};
//! use anyhow::Result;
//!
//! fn example_operation() -> Result<String> {
//!     Err(VectorError::RolesPathMissing.into())
//! }
//!
//! if let Err(e) = example_operation() {
//!     user_friendly_error(e).display();
//! }
//! ```

pub mod error;

pub use error::{ErrorContext, VectorError, error_chain, user_friendly_error};
