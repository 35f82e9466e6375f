//! The `cache` command.
//!
//! ```bash
//! release-vector cache path    # Print the cache file location
//! release-vector cache show    # Print the cached facts
//! release-vector cache clean   # Remove the cache file
//! ```

use anyhow::Result;
use clap::{Args, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use crate::cache::ResponseCache;
use crate::config::GlobalConfig;

/// Manage the response cache.
#[derive(Args, Debug)]
pub struct CacheCommand {
    #[command(subcommand)]
    command: CacheSubcommands,
}

#[derive(Subcommand, Debug)]
enum CacheSubcommands {
    /// Remove the cache file so the next run resolves again
    Clean,

    /// Print the cached facts as JSON
    Show,

    /// Print the location of the cache file
    Path,
}

impl CacheCommand {
    pub async fn execute(self, config_path: Option<PathBuf>) -> Result<bool> {
        let config = GlobalConfig::load_with_optional(config_path).await?;
        let cache = ResponseCache::from_config(&config)?;

        match self.command {
            CacheSubcommands::Clean => {
                if cache.clear()? {
                    println!("{} Removed response cache {}", "✓".green(), cache.path().display());
                } else {
                    println!("No response cache at {}", cache.path().display());
                }
            }
            CacheSubcommands::Show => match cache.load()? {
                Some(facts) => println!("{}", serde_json::to_string_pretty(&facts)?),
                None => println!("No response cache at {}", cache.path().display()),
            },
            CacheSubcommands::Path => println!("{}", cache.path().display()),
        }

        Ok(true)
    }
}
