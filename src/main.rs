//! release-vector CLI entry point
//!
//! Parses the command line, sets up logging and runs the selected command.
//! A failed action result exits with status 2, any other error with 1.

use anyhow::Result;
use clap::Parser;
use release_vector::cli;
use release_vector::core::user_friendly_error;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    // Set up colored output for Windows
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    cli.init_logging();

    match cli.execute().await {
        Ok(true) => Ok(()),
        Ok(false) => std::process::exit(2),
        Err(e) => {
            let error_ctx = user_friendly_error(e);
            error_ctx.display();
            std::process::exit(1);
        }
    }
}
