use anyhow::Result;
use predicates::prelude::*;

use crate::common::{TestProject, file_url};

const ROOT_VECTOR: &str = r#"
version: v0.15.0
docker-images:
  metal-stack:
    control-plane:
      metal-api:
        name: metalstack/metal-api
        tag: v0.7.8
shared: from-root
"#;

const CHILD_VECTOR: &str = r#"
images:
  gardener:
    name: metalstack/gardener
    tag: v1.2.3
shared: from-child
"#;

/// Writes a root vector referencing a child vector and the vectors file.
fn setup_nested(project: &TestProject) -> Result<()> {
    let child = project.write("vectors/child.yaml", CHILD_VECTOR)?;
    project.write(
        "vectors/root.yaml",
        &format!("{ROOT_VECTOR}vectors:\n  child:\n    url: {}\n", file_url(&child)),
    )?;
    let root = project.path().join("vectors/root.yaml");

    project.write(
        "vectors.yaml",
        &format!(
            r#"
- url: {}
  replace:
    - key: name
      old: metalstack/
      new: mirror.example/metal-stack/
  mapping:
    release_version: version
    metal_api_image_tag: docker-images.metal-stack.control-plane.metal-api.tag
    metal_api_image_name: docker-images.metal-stack.control-plane.metal-api.name
    shared: shared
  nested:
    - url_path: vectors.child.url
      mapping:
        gardener_image_name: images.gardener.name
        gardener_image_tag: images.gardener.tag
        shared: shared
"#,
            file_url(&root)
        ),
    )?;
    Ok(())
}

#[test]
fn test_resolve_nested_vectors() -> Result<()> {
    let project = TestProject::new()?;
    setup_nested(&project)?;

    let (code, result) = project.run_json(&["resolve", "--vectors", "vectors.yaml"])?;
    assert_eq!(code, 0, "{result}");

    let facts = &result["ansible_facts"];
    assert_eq!(facts["release_version"], "v0.15.0");
    assert_eq!(facts["metal_api_image_tag"], "v0.7.8");
    assert_eq!(facts["metal_api_image_name"], "mirror.example/metal-stack/metal-api");
    assert_eq!(facts["gardener_image_name"], "mirror.example/metal-stack/gardener");
    assert_eq!(facts["gardener_image_tag"], "v1.2.3");
    assert_eq!(facts["shared"], "from-root");
    assert_eq!(facts["_release_vectors_already_resolved"], true);
    assert_eq!(result["changed"], false);
    assert!(project.cache_file().exists());
    Ok(())
}

#[test]
fn test_extra_vars_are_not_overwritten() -> Result<()> {
    let project = TestProject::new()?;
    setup_nested(&project)?;

    let (code, result) = project.run_json(&[
        "resolve",
        "--vectors",
        "vectors.yaml",
        "--no-cache",
        "-e",
        "metal_api_image_tag=v0.8.0-pinned",
    ])?;
    assert_eq!(code, 0);
    assert!(result["ansible_facts"].get("metal_api_image_tag").is_none());
    assert_eq!(result["ansible_facts"]["gardener_image_tag"], "v1.2.3");
    assert!(!project.cache_file().exists());
    Ok(())
}

#[test]
fn test_cache_is_reused_until_disabled() -> Result<()> {
    let project = TestProject::new()?;
    setup_nested(&project)?;

    let (code, _) = project.run_json(&["resolve", "--vectors", "vectors.yaml"])?;
    assert_eq!(code, 0);

    std::fs::remove_file(project.path().join("vectors/child.yaml"))?;

    let (code, cached) = project.run_json(&["resolve", "--vectors", "vectors.yaml"])?;
    assert_eq!(code, 0);
    assert_eq!(cached["ansible_facts"]["gardener_image_tag"], "v1.2.3");

    let (code, fresh) = project.run_json(&["resolve", "--vectors", "vectors.yaml", "--no-cache"])?;
    assert_eq!(code, 2);
    assert_eq!(fresh["failed"], true);
    assert_eq!(fresh["msg"], "error resolving yaml");
    assert!(fresh.get("ansible_facts").is_none());
    Ok(())
}

#[test]
fn test_failed_result_reports_error_on_stderr() -> Result<()> {
    let project = TestProject::new()?;
    project.write("vectors.yaml", "- url: file:///does/not/exist.yaml\n  mapping:\n    a: a\n")?;

    project
        .command()
        .args(["resolve", "--vectors", "vectors.yaml", "--no-cache"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("\"failed\": true"))
        .stderr(predicate::str::contains("error"));
    Ok(())
}

#[test]
fn test_missing_vectors_are_skipped() -> Result<()> {
    let project = TestProject::new()?;

    let (code, result) = project.run_json(&["resolve"])?;
    assert_eq!(code, 0);
    assert_eq!(result["skipped"], true);
    assert_eq!(result["msg"], "no release vectors were provided");
    Ok(())
}

#[test]
fn test_vectors_from_vars_file() -> Result<()> {
    let project = TestProject::new()?;
    let vector = project.write("release.yaml", "a:\n  b: value\n")?;
    project.write(
        "group_vars.yaml",
        &format!(
            "release_vectors:\n  - url: {}\n    variable_mapping_path: my_mapping\nmy_mapping:\n  resolved_b: a.b\n",
            file_url(&vector)
        ),
    )?;

    let (code, result) = project.run_json(&["resolve", "--vars", "group_vars.yaml", "--no-cache"])?;
    assert_eq!(code, 0, "{result}");
    assert_eq!(result["ansible_facts"]["resolved_b"], "value");
    Ok(())
}

#[test]
fn test_smart_mode_and_force() -> Result<()> {
    let project = TestProject::new()?;
    let vector = project.write("release.yaml", "a: 1\n")?;
    project.write("vectors.yaml", &format!("- url: {}\n  mapping:\n    a: a\n", file_url(&vector)))?;
    project.write("facts.yaml", "ansible_facts:\n  _release_vectors_already_resolved: true\n")?;

    let (_, skipped) =
        project.run_json(&["resolve", "--vectors", "vectors.yaml", "--vars", "facts.yaml", "--no-cache"])?;
    assert_eq!(skipped["skipped"], true);

    let (_, forced) = project.run_json(&[
        "resolve",
        "--vectors",
        "vectors.yaml",
        "--vars",
        "facts.yaml",
        "--no-cache",
        "--force",
    ])?;
    assert_eq!(forced["ansible_facts"]["a"], 1);
    Ok(())
}

#[test]
fn test_yaml_output_to_file() -> Result<()> {
    let project = TestProject::new()?;
    let vector = project.write("release.yaml", "a: 1\n")?;
    project.write("vectors.yaml", &format!("- url: {}\n  mapping:\n    a: a\n", file_url(&vector)))?;

    project
        .command()
        .args(["resolve", "--vectors", "vectors.yaml", "--no-cache", "--format", "yaml", "--output", "out.yaml"])
        .assert()
        .success();

    let written = std::fs::read_to_string(project.path().join("out.yaml"))?;
    let parsed: serde_yaml::Value = serde_yaml::from_str(&written)?;
    assert_eq!(parsed["ansible_facts"]["a"].as_i64(), Some(1));
    Ok(())
}

#[test]
fn test_cyclic_vectors_fail() -> Result<()> {
    let project = TestProject::new()?;
    let a = project.path().join("a.yaml");
    let b = project.path().join("b.yaml");
    project.write("a.yaml", &format!("next: {}\n", file_url(&b)))?;
    project.write("b.yaml", &format!("next: {}\n", file_url(&a)))?;
    project.write(
        "vectors.yaml",
        &format!(
            "- url: {}\n  mapping: {{}}\n  nested:\n    - url_path: next\n      nested:\n        - url_path: next\n          mapping: {{}}\n",
            file_url(&a)
        ),
    )?;

    let (code, result) = project.run_json(&["resolve", "--vectors", "vectors.yaml", "--no-cache"])?;
    assert_eq!(code, 2);
    assert!(result["error"].as_str().unwrap_or_default().contains("cyclic reference"));
    Ok(())
}
