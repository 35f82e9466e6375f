//! Recursive resolution of release vectors into variables.
//!
//! [`RemoteResolver::resolve`] turns one [`VectorSpec`] into a flat set of
//! variables:
//!
//! 1. the document is loaded (the top-level URL may be a template rendered
//!    against the task variables);
//! 2. replacement rules are applied to it in order;
//! 3. declared roles are installed, unless disabled;
//! 4. the variable mapping is chosen, either given directly or looked up
//!    through [`VariableLayers`];
//! 5. every mapped path is resolved, missing paths are skipped with a
//!    warning;
//! 6. nested vectors are resolved recursively and merged in.
//!
//! # Precedence
//!
//! The first resolution that sets a variable to a non-null value wins. A
//! parent's own mapping is evaluated before its nested vectors, so it
//! shadows them; among siblings the earlier entry wins.
//!
//! # Shared State
//!
//! Everything that outlives a single document lives in [`ResolveContext`],
//! which the caller creates once per run and passes down explicitly: the
//! role defaults loaded so far and the chain of documents currently being
//! resolved. A nested reference back into that chain is a
//! [`VectorError::CyclicReference`].

pub mod defaults;
pub mod spec;

pub use spec::{ReplaceRule, RoleAlias, VectorSpec};

use anyhow::{Context, Result};
use serde_yaml::{Mapping, Value};
use std::borrow::Cow;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;

use crate::constants::{
    DEFAULT_ROLES_PATH_IN_DOCUMENT, GIT_CLONE_TIMEOUT, INSTALL_ROLES_VAR, REPLACEMENTS_VAR,
};
use crate::core::VectorError;
use crate::document::Document;
use crate::installer::{RoleInstaller, RoleOutcome};
use crate::loader::{ContentLoader, HttpTransport, OciOptions};
use crate::vars::{TaskVars, VariableLayers, scalar_to_string};
use crate::verify::SignatureVerifier;

/// Flat mapping of variable name to resolved value, in resolution order.
pub type ResolvedVars = Mapping;

type ResolveFuture<'a> = Pin<Box<dyn Future<Output = Result<ResolvedVars>> + 'a>>;

/// State shared by all resolutions of one run.
#[derive(Debug, Default)]
pub struct ResolveContext {
    role_defaults: Vec<(String, Mapping)>,
    merged_defaults: Mapping,
    stack: Vec<String>,
    roles: Vec<RoleOutcome>,
}

impl ResolveContext {
    /// A fresh context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Union of all role defaults loaded so far; later roles override
    /// earlier ones.
    pub fn role_defaults(&self) -> &Mapping {
        &self.merged_defaults
    }

    /// Names of the roles whose defaults are cached, in load order.
    pub fn cached_roles(&self) -> impl Iterator<Item = &str> {
        self.role_defaults.iter().map(|(name, _)| name.as_str())
    }

    /// Outcomes of every role processed so far.
    pub fn role_outcomes(&self) -> &[RoleOutcome] {
        &self.roles
    }

    /// Consume the context, keeping the role outcomes.
    pub fn into_role_outcomes(self) -> Vec<RoleOutcome> {
        self.roles
    }

    /// Load the defaults of `role` unless they are cached already.
    pub fn load_role_defaults(&mut self, role: &str, roles_path: &[PathBuf]) -> Result<()> {
        if self.role_defaults.iter().any(|(name, _)| name == role) {
            return Ok(());
        }

        let dir = defaults::find_role_dir(role, roles_path)?;
        let loaded = defaults::read_role_defaults(&dir)
            .with_context(|| format!("Failed to load defaults of role {role}"))?;
        tracing::debug!("Loaded {} default variables of role {}", loaded.len(), role);

        for (key, value) in &loaded {
            self.merged_defaults.insert(key.clone(), value.clone());
        }
        self.role_defaults.push((role.to_string(), loaded));
        Ok(())
    }

    fn enter(&mut self, url: &str) -> Result<()> {
        if self.stack.iter().any(|ancestor| ancestor == url) {
            let mut chain = self.stack.clone();
            chain.push(url.to_string());
            return Err(VectorError::CyclicReference {
                url: url.to_string(),
                chain: chain.join(" -> "),
            }
            .into());
        }
        self.stack.push(url.to_string());
        Ok(())
    }

    fn leave(&mut self) {
        self.stack.pop();
    }
}

// Settings a nested vector takes over from its parent
struct Inherited {
    replace: Vec<ReplaceRule>,
    oci: OciOptions,
    member: String,
}

/// Resolves vector specifications against remote documents.
pub struct RemoteResolver<'a> {
    loader: ContentLoader<'a>,
    task_vars: &'a TaskVars,
    roles_path: &'a [PathBuf],
    git_timeout: Duration,
}

impl<'a> RemoteResolver<'a> {
    /// Create a resolver.
    pub fn new(
        transport: &'a dyn HttpTransport,
        verifier: &'a SignatureVerifier,
        task_vars: &'a TaskVars,
        roles_path: &'a [PathBuf],
    ) -> Self {
        Self {
            loader: ContentLoader::new(transport, verifier),
            task_vars,
            roles_path,
            git_timeout: GIT_CLONE_TIMEOUT,
        }
    }

    /// Override the git clone timeout used for role installation.
    #[must_use]
    pub const fn with_git_timeout(mut self, timeout: Duration) -> Self {
        self.git_timeout = timeout;
        self
    }

    /// Resolve a top-level vector and all of its nested vectors.
    pub async fn resolve(&self, spec: &VectorSpec, ctx: &mut ResolveContext) -> Result<ResolvedVars> {
        let spec = self.expand(spec, ctx)?;
        let spec = spec.as_ref();
        let raw_url = spec.url.as_deref().filter(|url| !url.is_empty()).ok_or_else(|| {
            VectorError::ConfigError {
                message: "url is required".to_string(),
            }
        })?;
        let url = self.render(raw_url)?;

        let replace = match &spec.replace {
            Some(rules) => rules.clone(),
            None => match self.task_vars.get(REPLACEMENTS_VAR) {
                Some(value) => ReplaceRule::list_from_value(value)?,
                None => Vec::new(),
            },
        };
        let inherited = Inherited {
            replace,
            oci: spec.oci_options(),
            member: spec.tar_member().to_string(),
        };

        self.resolve_document(spec, url, inherited, false, ctx).await
    }

    fn resolve_document<'s>(
        &'s self,
        spec: &'s VectorSpec,
        url: String,
        inherited: Inherited,
        nested: bool,
        ctx: &'s mut ResolveContext,
    ) -> ResolveFuture<'s> {
        Box::pin(async move {
            ctx.enter(&url)?;
            let result = self.resolve_entered(spec, &url, &inherited, nested, ctx).await;
            ctx.leave();
            result
        })
    }

    async fn resolve_entered(
        &self,
        spec: &VectorSpec,
        url: &str,
        inherited: &Inherited,
        nested: bool,
        ctx: &mut ResolveContext,
    ) -> Result<ResolvedVars> {
        let mut document = self.loader.load(url, &inherited.oci, &inherited.member).await?;
        for rule in &inherited.replace {
            document.replace_key_value(&rule.key, &rule.old, &rule.new);
        }

        let install_roles =
            spec.install_roles.unwrap_or_else(|| self.task_vars.flag(INSTALL_ROLES_VAR, true));
        if install_roles {
            let roles = role_dict(&document, spec)?;
            if !roles.is_empty() {
                let outcomes = RoleInstaller::new(
                    self.loader.transport(),
                    self.loader.verifier(),
                    self.task_vars,
                    self.roles_path,
                )
                .with_git_timeout(self.git_timeout)
                .install(&roles, &spec.role_aliases, &inherited.oci)
                .await?;
                ctx.roles.extend(outcomes);
            }
        }

        let mut result = match self.mapping_for(spec, url, nested, ctx)? {
            Some(entries) => evaluate_mapping(&document, &entries),
            None => ResolvedVars::new(),
        };

        if !spec.recursive {
            return Ok(result);
        }

        for child in &spec.nested {
            let child = self.expand(child, ctx)?;
            let child = child.as_ref();
            let path = child.url_path.as_deref().filter(|p| !p.is_empty()).ok_or_else(|| {
                VectorError::InvalidSpec {
                    url: url.to_string(),
                    reason: "nested entries must contain an url_path".to_string(),
                }
            })?;
            let child_url = document.get_path(path).ok().and_then(scalar_to_string).ok_or_else(
                || VectorError::PathNotFound {
                    path: path.to_string(),
                    url: url.to_string(),
                },
            )?;
            let child_url = self.render(&child_url)?;

            let child_inherited = Inherited {
                replace: child
                    .replace
                    .iter()
                    .flatten()
                    .chain(inherited.replace.iter())
                    .cloned()
                    .collect(),
                oci: child.oci_options().inherit(&inherited.oci),
                member: child
                    .tar_member_file_name
                    .clone()
                    .unwrap_or_else(|| inherited.member.clone()),
            };

            let child_vars = self.resolve_document(child, child_url, child_inherited, true, ctx).await?;
            merge_first_wins(&mut result, child_vars);
        }

        Ok(result)
    }

    fn mapping_for(
        &self,
        spec: &VectorSpec,
        url: &str,
        nested: bool,
        ctx: &mut ResolveContext,
    ) -> Result<Option<Vec<(String, String)>>> {
        if let Some(mapping) = &spec.mapping {
            return spec::mapping_entries(mapping, url).map(Some);
        }

        let Some(path) = spec.variable_mapping_path.as_deref() else {
            if nested {
                tracing::debug!("Nested vector {} has no mapping, only following its references", url);
                return Ok(None);
            }
            return Err(VectorError::MissingMapping {
                url: url.to_string(),
            }
            .into());
        };

        let layers = VariableLayers::new(self.task_vars, ctx.role_defaults());
        let value = layers.get_path(path).map_err(|_| VectorError::MappingNotFound {
            path: path.to_string(),
        })?;
        let mapping = value.as_mapping().ok_or_else(|| VectorError::InvalidSpec {
            url: url.to_string(),
            reason: format!("mapping found at {path} is not a dict"),
        })?;
        spec::mapping_entries(mapping, url).map(Some)
    }

    // Load role defaults, then layer the vector over its meta variable
    fn expand<'v>(&self, spec: &'v VectorSpec, ctx: &mut ResolveContext) -> Result<Cow<'v, VectorSpec>> {
        for role in &spec.include_role_defaults {
            ctx.load_role_defaults(role, self.roles_path)?;
        }

        let Some(meta_var) = spec.meta_var.as_deref().filter(|v| !v.is_empty()) else {
            return Ok(Cow::Borrowed(spec));
        };
        let meta_var = self.render(meta_var)?;

        let layers = VariableLayers::new(self.task_vars, ctx.role_defaults());
        let meta = match layers.get_path(&meta_var) {
            Ok(Value::Mapping(meta)) if !meta.is_empty() => meta.clone(),
            Ok(Value::Null | Value::Mapping(_)) | Err(_) => {
                return Err(VectorError::ConfigError {
                    message: format!(
                        "the meta variable with name \"{meta_var}\" is not defined, provide it through the task variables or role defaults"
                    ),
                }
                .into());
            }
            Ok(_) => {
                return Err(VectorError::ConfigError {
                    message: format!("the meta variable \"{meta_var}\" must be a dict"),
                }
                .into());
            }
        };
        tracing::debug!("Using vector specification from {}", meta_var);

        let expanded = spec.over_meta(&meta)?;
        for role in &expanded.include_role_defaults {
            ctx.load_role_defaults(role, self.roles_path)?;
        }
        Ok(Cow::Owned(expanded))
    }

    // Templates like `{{ var }}` are rendered against the task variables
    fn render(&self, text: &str) -> Result<String> {
        if !text.contains("{{") && !text.contains("{%") {
            return Ok(text.to_string());
        }

        let context = tera::Context::from_serialize(self.task_vars.as_mapping()).map_err(|e| {
            VectorError::ConfigError {
                message: format!("task variables cannot be used to render {text}: {e}"),
            }
        })?;
        tera::Tera::one_off(text, &context, false).map_err(|e| {
            VectorError::ConfigError {
                message: format!("failed to render {text}: {e}"),
            }
            .into()
        })
    }
}

fn role_dict(document: &Document, spec: &VectorSpec) -> Result<Mapping> {
    if let Some(path) = spec.ansible_roles_path.as_deref() {
        return document.mapping(path).cloned();
    }

    match document.get_path(DEFAULT_ROLES_PATH_IN_DOCUMENT) {
        Ok(Value::Mapping(roles)) => Ok(roles.clone()),
        Ok(Value::Null) | Err(_) => Ok(Mapping::new()),
        Ok(_) => Err(VectorError::InvalidSpec {
            url: document.source().to_string(),
            reason: format!("{DEFAULT_ROLES_PATH_IN_DOCUMENT} must be a dict"),
        }
        .into()),
    }
}

fn evaluate_mapping(document: &Document, entries: &[(String, String)]) -> ResolvedVars {
    let mut result = ResolvedVars::new();
    for (name, path) in entries {
        match document.get_path(path) {
            Ok(value) => {
                result.insert(Value::String(name.clone()), value.clone());
            }
            Err(e) => {
                tracing::warn!(
                    "path {} provided by mapping does not exist in {} ({})",
                    path,
                    document.source(),
                    e
                );
            }
        }
    }
    result
}

/// Merge `source` into `target`, keeping values `target` already has set.
///
/// A null value in `target` does not count as set.
pub fn merge_first_wins(target: &mut ResolvedVars, source: ResolvedVars) {
    for (key, value) in source {
        if target.get(&key).is_some_and(|existing| !existing.is_null()) {
            continue;
        }
        target.insert(key, value);
    }
}
