//! Top-level actions and the result they report.
//!
//! An action never returns an error. Every fatal failure is turned into a
//! failed [`ActionResult`] carrying a short message, the rendered error chain
//! and a debug trace, the same shape an Ansible action plugin reports. No
//! partial facts are returned from a failed run.
//!
//! - [`ReleaseVectorAction`] resolves a list of vector specifications.
//! - [`ReleaseAction`] resolves named releases through URL templates.

pub mod release;
pub mod vector;

pub use release::{ReleaseAction, ReleaseArgs};
pub use vector::{ReleaseVectorAction, VectorArgs};

use serde::Serialize;
use serde_yaml::{Mapping, Value};

use crate::core::{ErrorContext, error_chain, user_friendly_error};
use crate::installer::RoleOutcome;

/// Outcome of an action run.
#[derive(Debug, Default, Serialize)]
pub struct ActionResult {
    pub changed: bool,

    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub skipped: bool,

    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub failed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,

    /// Rendered error chain of a failed run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Debug rendering of the error, including backtrace when captured
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ansible_facts: Option<Mapping>,

    /// Roles processed while resolving
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<RoleOutcome>,

    #[serde(skip)]
    report: Option<ErrorContext>,
}

impl ActionResult {
    /// A successful run returning `facts`.
    pub fn ok(facts: Mapping) -> Self {
        Self {
            ansible_facts: Some(facts),
            ..Self::default()
        }
    }

    /// A skipped run.
    pub fn skipped(msg: Option<&str>) -> Self {
        Self {
            skipped: true,
            msg: msg.map(str::to_string),
            ..Self::default()
        }
    }

    /// A failed run without an underlying error.
    pub fn failed(msg: impl Into<String>) -> Self {
        Self {
            failed: true,
            msg: Some(msg.into()),
            ..Self::default()
        }
    }

    /// A failed run caused by `error`.
    pub fn from_error(msg: impl Into<String>, error: anyhow::Error) -> Self {
        Self {
            failed: true,
            msg: Some(msg.into()),
            error: Some(error_chain(&error)),
            traceback: Some(format!("{error:?}")),
            report: Some(user_friendly_error(error)),
            ..Self::default()
        }
    }

    /// User-facing description of the error behind a failed run.
    pub fn report(&self) -> Option<&ErrorContext> {
        self.report.as_ref()
    }

    /// Facts of a successful run.
    pub fn facts(&self) -> Option<&Mapping> {
        self.ansible_facts.as_ref()
    }
}

/// A fatal condition inside an action, converted into a failed result.
#[derive(Debug)]
pub(crate) struct Failure {
    msg: String,
    cause: Option<anyhow::Error>,
}

impl Failure {
    pub(crate) fn new(msg: impl Into<String>) -> Self {
        Self {
            msg: msg.into(),
            cause: None,
        }
    }

    pub(crate) fn caused_by(msg: impl Into<String>, cause: impl Into<anyhow::Error>) -> Self {
        Self {
            msg: msg.into(),
            cause: Some(cause.into()),
        }
    }
}

impl From<Failure> for ActionResult {
    fn from(failure: Failure) -> Self {
        match failure.cause {
            Some(cause) => Self::from_error(failure.msg, cause),
            None => Self::failed(failure.msg),
        }
    }
}

/// Whether an argument counts as "not provided", the way Ansible treats
/// falsy values.
pub(crate) fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.is_empty(),
        Value::Sequence(seq) => seq.is_empty(),
        Value::Mapping(mapping) => mapping.is_empty(),
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::Tagged(_) => false,
    }
}
