//! The `releases` command.

use anyhow::Result;
use clap::Args;
use serde_yaml::Value;
use std::path::PathBuf;

use super::common::{CommandContext, TaskArgs, emit_result, read_yaml_file};
use crate::action::{ReleaseAction, ReleaseArgs};
use crate::loader::OciOptions;

/// Resolve named releases through the `<name>_release` task variables.
#[derive(Args, Debug)]
pub struct ReleasesCommand {
    #[command(flatten)]
    pub(super) task: TaskArgs,

    /// YAML file holding the list of `{ name, version }` releases
    #[arg(long, value_name = "FILE")]
    pub(super) releases: Option<PathBuf>,

    /// Resolve even if the facts mark the releases as resolved
    #[arg(long)]
    pub(super) force: bool,

    /// Username for `oci://` release URLs
    #[arg(long, env = "RELEASE_VECTOR_OCI_USERNAME", value_name = "USER")]
    pub(super) oci_username: Option<String>,

    /// Password for `oci://` release URLs
    #[arg(long, env = "RELEASE_VECTOR_OCI_PASSWORD", value_name = "PASSWORD", hide_env_values = true)]
    pub(super) oci_password: Option<String>,

    /// Registry scheme for `oci://` release URLs (`https` when unset)
    #[arg(long, value_name = "SCHEME")]
    pub(super) oci_scheme: Option<String>,
}

impl ReleasesCommand {
    pub async fn execute(self, config_path: Option<PathBuf>) -> Result<bool> {
        let ctx = CommandContext::load(config_path, &self.task).await?;
        let args = ReleaseArgs {
            releases: self.releases.as_deref().map(read_yaml_file).transpose()?,
            smart: self.force.then_some(Value::Bool(false)),
        };

        let oci = OciOptions {
            username: self.oci_username,
            password: self.oci_password,
            scheme: self.oci_scheme,
            ..OciOptions::default()
        };

        let result = ReleaseAction::new(&ctx.transport, &ctx.verifier)
            .with_oci_options(oci)
            .run(&args, &ctx.task_vars)
            .await;

        emit_result(&result, &self.task)
    }
}
