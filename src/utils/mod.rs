//! File system helpers shared by the cache, the archive extraction and the
//! CLI output.
//!
//! # Example
//!
//! ```rust,no_run
//! use release_vector::utils::{atomic_write, ensure_dir};
//! use std::path::Path;
//!
//! # fn example() -> anyhow::Result<()> {
//! ensure_dir(Path::new("/tmp/roles"))?;
//! atomic_write(Path::new("/tmp/release-vector-cache.json"), b"{}")?;
//! # Ok(())
//! # }
//! ```

pub mod fs;

pub use fs::{atomic_write, ensure_dir, read_json_file, remove_file_if_exists, write_json_file};
