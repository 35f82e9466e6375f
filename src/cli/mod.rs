//! Command-line interface for release-vector.
//!
//! # Available Commands
//!
//! - `resolve` - Resolve a list of release vectors into variables
//! - `releases` - Resolve named releases through URL templates
//! - `cache` - Inspect or remove the response cache
//!
//! # Usage
//!
//! ```bash
//! # Resolve the vectors of an inventory
//! release-vector resolve --vectors vectors.yaml --vars group_vars/all.yaml
//!
//! # Override a single variable and bypass the cache
//! release-vector resolve --vectors vectors.yaml -e metal_api_image_tag=v0.8.0 --no-cache
//!
//! # Force the next run to resolve again
//! release-vector cache clean
//! ```
//!
//! The result is printed to stdout as JSON (or YAML with `--format yaml`) in
//! the shape of an Ansible action result. Logs go to stderr.
//!
//! # Exit Status
//!
//! - `0` - the action succeeded or was skipped
//! - `1` - the command could not run (bad arguments, unreadable files)
//! - `2` - the action ran and reported a failed result
//!
//! # Global Options
//!
//! - `--verbose` - Enable debug output
//! - `--quiet` - Only log errors
//! - `--config` - Path to a custom global configuration file

mod cache;
pub mod common;
mod releases;
mod resolve;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Main CLI structure for release-vector.
#[derive(Parser, Debug)]
#[command(
    name = "release-vector",
    about = "Resolve metal-stack release vectors into deployment variables",
    version,
    long_about = "release-vector fetches release vector documents over HTTP or from OCI registries, \
                  follows nested vectors and maps values into a flat set of variables."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output (debug logging).
    ///
    /// Equivalent to `RUST_LOG=debug`. Mutually exclusive with `--quiet`.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to a custom global configuration file.
    ///
    /// Overrides `~/.release-vector/config.toml` and the
    /// `RELEASE_VECTOR_CONFIG` environment variable.
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Resolve release vectors into variables
    Resolve(resolve::ResolveCommand),

    /// Resolve named releases through URL templates
    Releases(releases::ReleasesCommand),

    /// Manage the response cache
    Cache(cache::CacheCommand),
}

impl Cli {
    /// The log filter selected by the global flags.
    ///
    /// `RUST_LOG` wins when it is set and no flag was given.
    #[must_use]
    pub fn log_filter(&self) -> EnvFilter {
        if self.verbose {
            EnvFilter::new("debug")
        } else if self.quiet {
            EnvFilter::new("error")
        } else {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
        }
    }

    /// Install the global tracing subscriber, writing to stderr.
    pub fn init_logging(&self) {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(self.log_filter())
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init();
    }

    /// Run the selected command.
    ///
    /// Returns `Ok(false)` when the command ran but reported a failed result.
    pub async fn execute(self) -> Result<bool> {
        match self.command {
            Commands::Resolve(cmd) => cmd.execute(self.config).await,
            Commands::Releases(cmd) => cmd.execute(self.config).await,
            Commands::Cache(cmd) => cmd.execute(self.config).await,
        }
    }
}
