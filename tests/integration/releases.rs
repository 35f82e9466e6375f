use anyhow::Result;

use crate::common::{TestProject, file_url};

fn setup(project: &TestProject) -> Result<()> {
    project.write("gardener/v1.90.0/release.yaml", "images:\n  apiserver: v1.90.0-api\n")?;

    let releases_root = file_url(&project.path().join("releases"));
    let gardener_root = file_url(&project.path().join("gardener"));
    project.write(
        "group_vars.yaml",
        &format!(
            r#"
metal_stack_release:
  url_template: {releases_root}/%s/release.yaml
  mapping:
    metal_api_image_tag: docker-images.metal-api.tag
  nested:
    - url_template_path: gardener.url_template
      version_path: gardener.version
      mapping_var: gardener_mapping
gardener_mapping:
  gardener_apiserver_tag: images.apiserver
"#
        ),
    )?;
    // The nested URL template comes from the release document itself
    project.write(
        "releases/v0.15.0/release.yaml",
        &format!(
            "docker-images:\n  metal-api:\n    tag: v0.7.8\ngardener:\n  version: v1.90.0\n  url_template: {gardener_root}/%s/release.yaml\n"
        ),
    )?;
    project.write("releases.yaml", "- name: metal-stack\n  version: v0.15.0\n")?;
    Ok(())
}

#[test]
fn test_releases_resolve_with_nested() -> Result<()> {
    let project = TestProject::new()?;
    setup(&project)?;

    let (code, result) =
        project.run_json(&["releases", "--releases", "releases.yaml", "--vars", "group_vars.yaml"])?;
    assert_eq!(code, 0, "{result}");

    let facts = &result["ansible_facts"];
    assert_eq!(facts["metal_api_image_tag"], "v0.7.8");
    assert_eq!(facts["gardener_apiserver_tag"], "v1.90.0-api");
    assert_eq!(facts["_releases_already_resolved"], true);
    Ok(())
}

#[test]
fn test_unknown_release_fails() -> Result<()> {
    let project = TestProject::new()?;
    setup(&project)?;
    project.write("other.yaml", "- name: unknown\n  version: v1\n")?;

    let (code, result) =
        project.run_json(&["releases", "--releases", "other.yaml", "--vars", "group_vars.yaml"])?;
    assert_eq!(code, 2);
    assert_eq!(result["msg"], "release info variable unknown_release is not defined");
    Ok(())
}
