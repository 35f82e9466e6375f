//! Shared arguments and plumbing for the action commands.

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use colored::Colorize;
use serde_yaml::Value;
use std::path::{Path, PathBuf};

use crate::action::ActionResult;
use crate::cache::ResponseCache;
use crate::config::GlobalConfig;
use crate::loader::ReqwestTransport;
use crate::utils::atomic_write;
use crate::vars::TaskVars;
use crate::verify::SignatureVerifier;

/// Format of the printed result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Json,
    Yaml,
}

/// Arguments shared by every command that runs an action.
#[derive(Args, Debug, Clone, Default)]
pub struct TaskArgs {
    /// YAML file with task variables; may be repeated, later files win
    #[arg(long = "vars", value_name = "FILE")]
    pub vars: Vec<PathBuf>,

    /// Set a task variable (`key=value`); wins over `--vars`
    #[arg(short = 'e', long = "extra-var", value_name = "KEY=VALUE")]
    pub extra_vars: Vec<String>,

    /// Write the result to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format of the result
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,
}

impl TaskArgs {
    /// Build the task variables from `--vars` files and `-e` overrides.
    pub fn task_vars(&self) -> Result<TaskVars> {
        let mut task_vars = TaskVars::load_files(&self.vars)?;
        task_vars.apply_extra_vars(&self.extra_vars)?;
        Ok(task_vars)
    }
}

/// Everything an action needs, built from the configuration and arguments.
pub struct CommandContext {
    pub config: GlobalConfig,
    pub task_vars: TaskVars,
    pub roles_path: Vec<PathBuf>,
    pub transport: ReqwestTransport,
    pub verifier: SignatureVerifier,
    pub cache: ResponseCache,
}

impl CommandContext {
    /// Load the global configuration and the task variables.
    pub async fn load(config_path: Option<PathBuf>, args: &TaskArgs) -> Result<Self> {
        let config = GlobalConfig::load_with_optional(config_path).await?;
        let task_vars = args.task_vars()?;
        let roles_path = config.roles_search_path()?;
        let transport = ReqwestTransport::new(config.http_timeout())?;
        let verifier = SignatureVerifier::new(config.cosign_binary.clone());
        let cache = ResponseCache::from_config(&config)?;

        tracing::debug!(
            "Loaded {} task variables, roles path: {:?}",
            task_vars.as_mapping().len(),
            roles_path
        );

        Ok(Self {
            config,
            task_vars,
            roles_path,
            transport,
            verifier,
            cache,
        })
    }
}

/// Read a YAML file given on the command line.
pub fn read_yaml_file(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_yaml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Render a result in the requested format.
pub fn render_result(result: &ActionResult, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => {
            serde_json::to_string_pretty(result).context("Failed to serialize result as JSON")
        }
        OutputFormat::Yaml => {
            serde_yaml::to_string(result).context("Failed to serialize result as YAML")
        }
    }
}

/// Print (or write) a result and report a failure on stderr.
///
/// Returns whether the result counts as success.
pub fn emit_result(result: &ActionResult, args: &TaskArgs) -> Result<bool> {
    let rendered = render_result(result, args.format)?;
    match &args.output {
        Some(path) => {
            atomic_write(path, rendered.as_bytes())?;
            tracing::info!("Wrote result to {}", path.display());
        }
        None => println!("{rendered}"),
    }

    if result.failed {
        match result.report() {
            Some(report) => report.display(),
            None => eprintln!("{}: {}", "error".red().bold(), result.msg.as_deref().unwrap_or("failed")),
        }
        return Ok(false);
    }

    if result.skipped {
        tracing::info!("Skipped: {}", result.msg.as_deref().unwrap_or("nothing to do"));
    }
    Ok(true)
}
