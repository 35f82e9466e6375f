//! The `resolve` command.

use anyhow::Result;
use clap::Args;
use serde_yaml::Value;
use std::path::PathBuf;

use super::common::{CommandContext, TaskArgs, emit_result, read_yaml_file};
use crate::action::{ReleaseVectorAction, VectorArgs};

/// Resolve release vectors into variables.
///
/// Vectors are read from `--vectors`, or from the `release_vectors` task
/// variable when the flag is omitted.
#[derive(Args, Debug)]
pub struct ResolveCommand {
    #[command(flatten)]
    pub(super) task: TaskArgs,

    /// YAML file holding the list of vector specifications
    #[arg(long, value_name = "FILE")]
    pub(super) vectors: Option<PathBuf>,

    /// Neither read nor write the response cache
    #[arg(long)]
    pub(super) no_cache: bool,

    /// Resolve even if the facts mark the vectors as resolved
    #[arg(long)]
    pub(super) force: bool,
}

impl ResolveCommand {
    pub async fn execute(self, config_path: Option<PathBuf>) -> Result<bool> {
        let ctx = CommandContext::load(config_path, &self.task).await?;
        let args = VectorArgs {
            vectors: self.vectors.as_deref().map(read_yaml_file).transpose()?,
            cache: self.no_cache.then_some(Value::Bool(false)),
            smart: self.force.then_some(Value::Bool(false)),
        };

        let result = ReleaseVectorAction::new(&ctx.transport, &ctx.verifier, &ctx.roles_path, &ctx.cache)
            .with_git_timeout(ctx.config.git_timeout())
            .run(&args, &ctx.task_vars)
            .await;

        emit_result(&result, &self.task)
    }
}
