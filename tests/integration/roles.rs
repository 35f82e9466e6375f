use anyhow::Result;
use release_vector::test_utils::TestGit;

use crate::common::{TestProject, file_url};

#[test]
fn test_roles_are_installed_from_git() -> Result<()> {
    let project = TestProject::new()?;
    let repo = TestGit::create_role_repo(
        project.path().join("repos/ansible-common"),
        &[("tasks/main.yaml", "- debug: msg=hello\n"), ("defaults/main.yaml", "common_mapping:\n  a: a\n")],
        "v0.5.0",
    )?;
    let vector = project.write(
        "release.yaml",
        &format!(
            "a: 1\nansible-roles:\n  ansible-common:\n    repository: {}\n    version: v0.5.0\n  no-source:\n    version: v1\n",
            repo.url()
        ),
    )?;
    // The mapping lives in the defaults of the role the vector installs
    project.write(
        "vectors.yaml",
        &format!(
            "- url: {}\n  variable_mapping_path: common_mapping\n  include_role_defaults: ansible-common\n",
            file_url(&vector)
        ),
    )?;

    let (code, result) = project.run_json(&["resolve", "--vectors", "vectors.yaml", "--no-cache"])?;
    assert_eq!(code, 0, "{result}");
    assert_eq!(result["changed"], true);
    assert_eq!(result["ansible_facts"]["a"], 1);
    assert!(project.roles_dir().join("ansible-common/tasks/main.yaml").is_file());

    let roles = result["roles"].as_array().expect("roles are reported");
    assert_eq!(roles[0]["status"], "installed");
    assert_eq!(roles[1]["status"], "skipped");
    assert_eq!(roles[1]["reason"], "no_source");

    // A second run leaves the installed role alone
    let (code, again) = project.run_json(&["resolve", "--vectors", "vectors.yaml", "--no-cache"])?;
    assert_eq!(code, 0);
    assert_eq!(again["changed"], false);
    assert_eq!(again["roles"][0]["reason"], "already_installed");
    Ok(())
}

#[test]
fn test_role_without_version_fails() -> Result<()> {
    let project = TestProject::new()?;
    let vector = project.write(
        "release.yaml",
        "a: 1\nansible-roles:\n  broken:\n    repository: https://example.invalid/broken.git\n",
    )?;
    project.write("vectors.yaml", &format!("- url: {}\n  mapping:\n    a: a\n", file_url(&vector)))?;

    let (code, result) = project.run_json(&["resolve", "--vectors", "vectors.yaml", "--no-cache"])?;
    assert_eq!(code, 2);
    assert!(result["error"].as_str().unwrap_or_default().contains("no version specified for role broken"));
    Ok(())
}
