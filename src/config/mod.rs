//! Configuration for release-vector.
//!
//! Only one configuration layer exists: the global user configuration in
//! [`global`]. Everything that varies per run (vectors, credentials,
//! replacements) is part of the task arguments and variables instead.

pub mod global;

pub use global::GlobalConfig;
