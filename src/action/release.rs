//! Resolving named releases through URL templates.
//!
//! A release names an entry of the task variables (`<name>_release`) that
//! describes where its vector lives and how to map it:
//!
//! ```yaml
//! metal_stack_release:
//!   url_template: https://example.com/releases/%s/release.yaml
//!   mapping:
//!     metal_api_image_tag: docker-images.metal-stack.control-plane.metal-api.tag
//!   nested:
//!     - url_template_path: sub.url_template
//!       version_path: sub.version
//!       mapping_var: sub_release_mapping
//! ```
//!
//! Nested releases are resolved first and a parent's mapping is applied
//! last, so the parent overrides what its nested releases produced.

use serde_yaml::{Mapping, Value};
use std::future::Future;
use std::pin::Pin;

use super::{ActionResult, Failure, is_empty_value};
use crate::constants::{
    DEFAULT_TAR_MEMBER, RELEASES_RESOLVED_MARKER, RELEASES_SMART_VAR, RELEASES_VAR,
};
use crate::core::VectorError;
use crate::document::Document;
use crate::loader::{ContentLoader, HttpTransport, OciOptions};
use crate::resolver::spec::mapping_entries;
use crate::vars::{TaskVars, role_var_name, scalar_to_string, to_bool};
use crate::verify::SignatureVerifier;

type ReleaseFuture<'a> = Pin<Box<dyn Future<Output = Result<(), Failure>> + 'a>>;

/// Task arguments. Each unset argument falls back to its task variable.
#[derive(Debug, Clone, Default)]
pub struct ReleaseArgs {
    /// List of `{ name, version, recursive }` entries (`setup_release`)
    pub releases: Option<Value>,
    /// Skip when already resolved (`setup_release_smart`, default true)
    pub smart: Option<Value>,
}

/// Resolves named releases.
pub struct ReleaseAction<'a> {
    loader: ContentLoader<'a>,
    oci: OciOptions,
}

// Mutable state of one run
#[derive(Default)]
struct ReleaseRun {
    facts: Mapping,
    stack: Vec<String>,
}

impl<'a> ReleaseAction<'a> {
    pub fn new(transport: &'a dyn HttpTransport, verifier: &'a SignatureVerifier) -> Self {
        Self {
            loader: ContentLoader::new(transport, verifier),
            oci: OciOptions::default(),
        }
    }

    /// Registry settings used when a release URL is an OCI reference.
    #[must_use]
    pub fn with_oci_options(mut self, oci: OciOptions) -> Self {
        self.oci = oci;
        self
    }

    /// Run the action.
    pub async fn run(&self, args: &ReleaseArgs, task_vars: &TaskVars) -> ActionResult {
        let Some(releases) = args
            .releases
            .as_ref()
            .or_else(|| task_vars.get(RELEASES_VAR))
            .filter(|value| !is_empty_value(value))
        else {
            return ActionResult::skipped(None);
        };

        let Some(releases) = releases.as_sequence() else {
            return ActionResult::failed("releases must be a list");
        };

        let smart = match args.smart.as_ref() {
            Some(value) => to_bool(value, true),
            None => task_vars.flag(RELEASES_SMART_VAR, true),
        };
        if smart && task_vars.fact_flag(RELEASES_RESOLVED_MARKER) {
            tracing::debug!("Releases are already resolved, skipping");
            return ActionResult::skipped(None);
        }

        let mut run = ReleaseRun::default();
        run.facts.insert(Value::String(RELEASES_RESOLVED_MARKER.to_string()), Value::Bool(true));

        for release in releases {
            if let Err(failure) = self.resolve_release(release, task_vars, &mut run).await {
                return failure.into();
            }
        }

        ActionResult::ok(run.facts)
    }

    async fn resolve_release(
        &self,
        release: &Value,
        task_vars: &TaskVars,
        run: &mut ReleaseRun,
    ) -> Result<(), Failure> {
        let version = release.get("version").and_then(scalar_to_string);
        let name = release.get("name").and_then(scalar_to_string);
        let recursive = release.get("recursive").is_none_or(|value| to_bool(value, true));

        let version = version.ok_or_else(|| Failure::new("version is required in a release"))?;
        let name = name.ok_or_else(|| Failure::new("name is required in a release"))?;

        let release_key = format!("{}_release", role_var_name(&name));
        let info = task_vars
            .get(&release_key)
            .filter(|info| !is_empty_value(info))
            .ok_or_else(|| Failure::new(format!("release info variable {release_key} is not defined")))?;
        let url_template = info
            .get("url_template")
            .and_then(scalar_to_string)
            .ok_or_else(|| Failure::new("url_template is required in a release"))?;
        let mapping = info
            .get("mapping")
            .and_then(Value::as_mapping)
            .filter(|mapping| !mapping.is_empty())
            .cloned()
            .ok_or_else(|| Failure::new("mapping is required in a release"))?;
        let nested = if recursive {
            info.get("nested").and_then(Value::as_sequence).cloned().unwrap_or_default()
        } else {
            Vec::new()
        };

        tracing::info!("Resolving release {} ({})", name, version);
        self.resolve(url_template, version, mapping, nested, task_vars, run).await
    }

    fn resolve<'s>(
        &'s self,
        url_template: String,
        version: String,
        mapping: Mapping,
        nested: Vec<Value>,
        task_vars: &'s TaskVars,
        run: &'s mut ReleaseRun,
    ) -> ReleaseFuture<'s> {
        Box::pin(async move {
            if version.is_empty() {
                return Err(Failure::new("version is required"));
            }
            if url_template.is_empty() {
                return Err(Failure::new("url_template is required"));
            }
            if mapping.is_empty() {
                return Err(Failure::new("mapping is required"));
            }

            let url = url_template.replace("%s", &version);
            let fetch_failure = || format!("error getting image vector from url: {url}");

            if run.stack.contains(&url) {
                let mut chain = run.stack.clone();
                chain.push(url.clone());
                return Err(Failure::caused_by(
                    fetch_failure(),
                    VectorError::CyclicReference {
                        url: url.clone(),
                        chain: chain.join(" -> "),
                    },
                ));
            }

            let document = self
                .loader
                .load(&url, &self.oci, DEFAULT_TAR_MEMBER)
                .await
                .map_err(|e| Failure::caused_by(fetch_failure(), e))?;

            run.stack.push(url.clone());
            let nested_result = self.resolve_nested(&document, &nested, task_vars, run).await;
            run.stack.pop();
            nested_result?;

            let entries =
                mapping_entries(&mapping, &url).map_err(|e| Failure::caused_by("mapping is invalid", e))?;
            for (name, path) in entries {
                if task_vars.is_defined(&name) {
                    continue;
                }
                match document.get_path(&path) {
                    Ok(value) => {
                        run.facts.insert(Value::String(name), value.clone());
                    }
                    Err(e) => {
                        tracing::warn!(
                            "error reading image version from release vector, {} (does the mapping match the given release '{}'?)",
                            e,
                            version
                        );
                    }
                }
            }

            Ok(())
        })
    }

    async fn resolve_nested(
        &self,
        document: &Document,
        nested: &[Value],
        task_vars: &TaskVars,
        run: &mut ReleaseRun,
    ) -> Result<(), Failure> {
        for entry in nested {
            let text = |key: &str| entry.get(key).and_then(scalar_to_string);
            let url_template_path = text("url_template_path")
                .ok_or_else(|| Failure::new("url_template_path is required in nested"))?;
            let version_path =
                text("version_path").ok_or_else(|| Failure::new("version_path is required in nested"))?;
            let mapping_var =
                text("mapping_var").ok_or_else(|| Failure::new("mapping_var is required in nested"))?;
            let next_nested =
                entry.get("nested").and_then(Value::as_sequence).cloned().unwrap_or_default();

            let path_failure = |e: anyhow::Error| {
                Failure::caused_by(format!("error resolving path: {url_template_path}"), e)
            };
            let url_template = document
                .get_path(&url_template_path)
                .map_err(|e| path_failure(e.into()))
                .and_then(|value| {
                    scalar_to_string(value).ok_or_else(|| {
                        path_failure(anyhow::anyhow!("value at {url_template_path} is not a string"))
                    })
                })?;
            let version = document
                .get_path(&version_path)
                .map_err(|e| path_failure(e.into()))
                .and_then(|value| {
                    scalar_to_string(value).ok_or_else(|| {
                        path_failure(anyhow::anyhow!("value at {version_path} is not a string"))
                    })
                })?;
            let mapping = task_vars
                .get_path(&mapping_var)
                .map_err(|e| path_failure(e.into()))
                .and_then(|value| {
                    value.as_mapping().cloned().ok_or_else(|| {
                        path_failure(anyhow::anyhow!("variable {mapping_var} is not a dict"))
                    })
                })?;

            self.resolve(url_template, version, mapping, next_nested, task_vars, run).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::HttpResponse;
    use crate::test_utils::MockTransport;

    const RELEASE_URL: &str = "https://example.com/releases/v0.8.0/release.yaml";
    const SUB_URL: &str = "https://example.com/sub/v1.2.0/sub.yaml";

    fn vars(text: &str) -> TaskVars {
        TaskVars::from_mapping(serde_yaml::from_str(text).unwrap())
    }

    fn args(releases: &str) -> ReleaseArgs {
        ReleaseArgs {
            releases: Some(serde_yaml::from_str(releases).unwrap()),
            smart: None,
        }
    }

    async fn run(transport: &MockTransport, args: &ReleaseArgs, task_vars: &TaskVars) -> ActionResult {
        let verifier = SignatureVerifier::default();
        ReleaseAction::new(transport, &verifier).run(args, task_vars).await
    }

    const RELEASE_INFO: &str = r#"
metal_stack_release:
  url_template: https://example.com/releases/%s/release.yaml
  mapping:
    metal_api_image_tag: docker-images.metal-api.tag
    shared: shared
  nested:
    - url_template_path: sub.url_template
      version_path: sub.version
      mapping_var: sub_mapping
sub_mapping:
  sub_tag: tag
  shared: shared
"#;

    fn release_transport() -> MockTransport {
        let transport = MockTransport::new();
        transport.respond(
            RELEASE_URL,
            HttpResponse::new(
                200,
                "docker-images:\n  metal-api:\n    tag: v0.7.8\nshared: parent\nsub:\n  url_template: https://example.com/sub/%s/sub.yaml\n  version: v1.2.0\n",
            ),
        );
        transport.respond(SUB_URL, HttpResponse::new(200, "tag: v9\nshared: child\n"));
        transport
    }

    #[tokio::test]
    async fn test_release_with_nested() {
        let transport = release_transport();
        let result = run(&transport, &args("- name: metal-stack\n  version: v0.8.0\n"), &vars(RELEASE_INFO)).await;

        assert!(!result.failed, "{:?}", result.msg);
        let facts = result.facts().unwrap();
        assert_eq!(facts.get("metal_api_image_tag").and_then(Value::as_str), Some("v0.7.8"));
        assert_eq!(facts.get("sub_tag").and_then(Value::as_str), Some("v9"));
        // the parent mapping is applied after its nested releases
        assert_eq!(facts.get("shared").and_then(Value::as_str), Some("parent"));
        assert_eq!(facts.get(RELEASES_RESOLVED_MARKER), Some(&Value::Bool(true)));
        assert_eq!(transport.requested_urls(), vec![RELEASE_URL, SUB_URL]);
    }

    #[tokio::test]
    async fn test_non_recursive_release_ignores_nested() {
        let transport = release_transport();
        let result = run(
            &transport,
            &args("- name: metal-stack\n  version: v0.8.0\n  recursive: false\n"),
            &vars(RELEASE_INFO),
        )
        .await;

        assert!(!result.failed);
        assert!(!result.facts().unwrap().contains_key("sub_tag"));
        assert_eq!(transport.requested_urls(), vec![RELEASE_URL]);
    }

    #[tokio::test]
    async fn test_defined_task_vars_are_skipped() {
        let transport = release_transport();
        let task_vars = vars(&format!("{RELEASE_INFO}metal_api_image_tag: pinned\n"));
        let result = run(&transport, &args("- name: metal-stack\n  version: v0.8.0\n"), &task_vars).await;

        assert!(!result.facts().unwrap().contains_key("metal_api_image_tag"));
    }

    #[tokio::test]
    async fn test_validation_messages() {
        let transport = MockTransport::new();
        let cases = [
            ("- name: metal-stack\n", "version is required in a release"),
            ("- version: v1\n", "name is required in a release"),
            ("- name: other\n  version: v1\n", "release info variable other_release is not defined"),
        ];
        for (releases, expected) in cases {
            let result = run(&transport, &args(releases), &vars(RELEASE_INFO)).await;
            assert!(result.failed);
            assert_eq!(result.msg.as_deref(), Some(expected));
        }

        let no_template = vars("x_release:\n  mapping:\n    a: a\n");
        let result = run(&transport, &args("- name: x\n  version: v1\n"), &no_template).await;
        assert_eq!(result.msg.as_deref(), Some("url_template is required in a release"));

        let no_mapping = vars("x_release:\n  url_template: https://example.com/%s\n");
        let result = run(&transport, &args("- name: x\n  version: v1\n"), &no_mapping).await;
        assert_eq!(result.msg.as_deref(), Some("mapping is required in a release"));

        let result = run(&transport, &args("name: x\n"), &no_mapping).await;
        assert_eq!(result.msg.as_deref(), Some("releases must be a list"));
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_nested_validation_and_path_errors() {
        let transport = release_transport();
        let missing_key = vars(
            "metal_stack_release:\n  url_template: https://example.com/releases/%s/release.yaml\n  mapping:\n    a: shared\n  nested:\n    - url_template_path: sub.url_template\n      mapping_var: sub_mapping\n",
        );
        let result = run(&transport, &args("- name: metal-stack\n  version: v0.8.0\n"), &missing_key).await;
        assert_eq!(result.msg.as_deref(), Some("version_path is required in nested"));

        let bad_path = vars(
            "metal_stack_release:\n  url_template: https://example.com/releases/%s/release.yaml\n  mapping:\n    a: shared\n  nested:\n    - url_template_path: sub.nope\n      version_path: sub.version\n      mapping_var: sub_mapping\nsub_mapping:\n  b: tag\n",
        );
        let result = run(&transport, &args("- name: metal-stack\n  version: v0.8.0\n"), &bad_path).await;
        assert!(result.failed);
        assert_eq!(result.msg.as_deref(), Some("error resolving path: sub.nope"));
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn test_fetch_failure() {
        let transport = MockTransport::new();
        let result = run(&transport, &args("- name: metal-stack\n  version: v0.8.0\n"), &vars(RELEASE_INFO)).await;
        assert!(result.failed);
        assert_eq!(result.msg.as_deref(), Some(format!("error getting image vector from url: {RELEASE_URL}").as_str()));
        assert!(result.facts().is_none());
    }

    #[tokio::test]
    async fn test_smart_mode() {
        let transport = MockTransport::new();
        let task_vars = vars(&format!("{RELEASE_INFO}ansible_facts:\n  _releases_already_resolved: true\n"));
        let result = run(&transport, &args("- name: metal-stack\n  version: v0.8.0\n"), &task_vars).await;
        assert!(result.skipped);
        assert!(transport.requests().is_empty());

        let result = run(&transport, &ReleaseArgs::default(), &TaskVars::new()).await;
        assert!(result.skipped);
    }

    #[tokio::test]
    async fn test_self_reference_is_a_cycle() {
        let transport = MockTransport::new();
        transport.respond(
            RELEASE_URL,
            HttpResponse::new(200, "self:\n  url_template: https://example.com/releases/%s/release.yaml\n  version: v0.8.0\n"),
        );
        let task_vars = vars(
            "metal_stack_release:\n  url_template: https://example.com/releases/%s/release.yaml\n  mapping:\n    a: a\n  nested:\n    - url_template_path: self.url_template\n      version_path: self.version\n      mapping_var: loop_mapping\nloop_mapping:\n  a: a\n",
        );

        let result = run(&transport, &args("- name: metal-stack\n  version: v0.8.0\n"), &task_vars).await;
        assert!(result.failed);
        assert!(result.error.as_deref().unwrap().contains("cyclic reference"));
    }
}
