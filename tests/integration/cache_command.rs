use anyhow::Result;
use predicates::prelude::*;

use crate::common::TestProject;

#[test]
fn test_cache_path_and_clean() -> Result<()> {
    let project = TestProject::new()?;

    project
        .command()
        .args(["cache", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("release-vector-cache.json"));

    project
        .command()
        .args(["cache", "clean"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No response cache"));

    std::fs::write(project.cache_file(), "{\"a\":1}")?;
    project
        .command()
        .args(["cache", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"a\": 1"));

    project
        .command()
        .args(["cache", "clean"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed response cache"));
    assert!(!project.cache_file().exists());
    Ok(())
}
