//! Resolving a list of release vectors into facts.

use anyhow::Result;
use serde_yaml::{Mapping, Value};
use std::path::PathBuf;
use std::time::Duration;

use super::{ActionResult, is_empty_value};
use crate::cache::ResponseCache;
use crate::constants::{CACHE_VAR, GIT_CLONE_TIMEOUT, SMART_VAR, VECTORS_RESOLVED_MARKER, VECTORS_VAR};
use crate::installer::RoleOutcome;
use crate::loader::HttpTransport;
use crate::resolver::{RemoteResolver, ResolveContext, VectorSpec};
use crate::vars::{TaskVars, to_bool};
use crate::verify::SignatureVerifier;

/// Task arguments. Each unset argument falls back to its task variable.
#[derive(Debug, Clone, Default)]
pub struct VectorArgs {
    /// List of vector specifications (`release_vectors`)
    pub vectors: Option<Value>,
    /// Use the response cache (`release_vector_cache`, default true)
    pub cache: Option<Value>,
    /// Skip when already resolved (`release_vector_smart`, default true)
    pub smart: Option<Value>,
}

/// Resolves release vectors and returns the variables as facts.
pub struct ReleaseVectorAction<'a> {
    transport: &'a dyn HttpTransport,
    verifier: &'a SignatureVerifier,
    roles_path: &'a [PathBuf],
    cache: &'a ResponseCache,
    git_timeout: Duration,
}

impl<'a> ReleaseVectorAction<'a> {
    pub fn new(
        transport: &'a dyn HttpTransport,
        verifier: &'a SignatureVerifier,
        roles_path: &'a [PathBuf],
        cache: &'a ResponseCache,
    ) -> Self {
        Self {
            transport,
            verifier,
            roles_path,
            cache,
            git_timeout: GIT_CLONE_TIMEOUT,
        }
    }

    #[must_use]
    pub const fn with_git_timeout(mut self, timeout: Duration) -> Self {
        self.git_timeout = timeout;
        self
    }

    /// Run the action.
    ///
    /// The order of checks matters: an existing cache file is returned
    /// before the vectors are even validated.
    pub async fn run(&self, args: &VectorArgs, task_vars: &TaskVars) -> ActionResult {
        let Some(vectors) = args
            .vectors
            .as_ref()
            .or_else(|| task_vars.get(VECTORS_VAR))
            .filter(|value| !is_empty_value(value))
        else {
            return ActionResult::skipped(Some("no release vectors were provided"));
        };

        if option_flag(args.smart.as_ref(), task_vars, SMART_VAR)
            && task_vars.fact_flag(VECTORS_RESOLVED_MARKER)
        {
            tracing::debug!("Release vectors are already resolved, skipping");
            return ActionResult::skipped(None);
        }

        let cache_enabled = option_flag(args.cache.as_ref(), task_vars, CACHE_VAR);
        if cache_enabled {
            match self.cache.load() {
                Ok(Some(facts)) => {
                    tracing::info!("Returning cached facts from {}", self.cache.path().display());
                    return ActionResult::ok(facts);
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("Ignoring unreadable response cache: {:#}", e),
            }
        }

        let Some(vectors) = vectors.as_sequence() else {
            return ActionResult::failed("vectors must be a list");
        };

        let (facts, roles) = match self.resolve_all(vectors, task_vars).await {
            Ok(resolved) => resolved,
            Err(e) => return ActionResult::from_error("error resolving yaml", e),
        };

        if cache_enabled {
            if let Err(e) = self.cache.store(&facts) {
                return ActionResult::from_error("error writing response cache", e);
            }
            tracing::debug!("Written cache file to {}", self.cache.path().display());
        }

        ActionResult {
            changed: roles.iter().any(RoleOutcome::is_installed),
            roles,
            ..ActionResult::ok(facts)
        }
    }

    async fn resolve_all(
        &self,
        vectors: &[Value],
        task_vars: &TaskVars,
    ) -> Result<(Mapping, Vec<RoleOutcome>)> {
        let resolver = RemoteResolver::new(self.transport, self.verifier, task_vars, self.roles_path)
            .with_git_timeout(self.git_timeout);
        let mut ctx = ResolveContext::new();
        let mut facts = Mapping::new();

        for value in vectors {
            let spec = VectorSpec::from_value(value)?;
            let resolved = resolver.resolve(&spec, &mut ctx).await?;
            merge_facts(&mut facts, resolved, task_vars);
        }

        facts.insert(Value::String(VECTORS_RESOLVED_MARKER.to_string()), Value::Bool(true));
        Ok((facts, ctx.into_role_outcomes()))
    }
}

// User-defined variables win, then the first vector that set a name
fn merge_facts(facts: &mut Mapping, resolved: Mapping, task_vars: &TaskVars) {
    for (key, value) in resolved {
        let Some(name) = key.as_str() else {
            continue;
        };
        if task_vars.is_defined(name) {
            continue;
        }
        if let Some(existing) = facts.get(&key).filter(|existing| !existing.is_null()) {
            tracing::warn!(
                "variable {} was resolved more than once, using first defined value ({})",
                name,
                serde_json::to_string(existing).unwrap_or_default()
            );
            continue;
        }
        facts.insert(key, value);
    }
}

fn option_flag(arg: Option<&Value>, task_vars: &TaskVars, var: &str) -> bool {
    match arg {
        Some(value) => to_bool(value, true),
        None => task_vars.flag(var, true),
    }
}
