//! End-to-end tests for the `status` command.

mod common;
use common::prelude::*;
use common::configs;

#[test]
fn test_status_on_fresh_project() {
    let fixture = ProjectFixture::bare();
    fixture.write_config(configs::MINIMAL);

    let mut cmd = cargo_bin_cmd!("multibranch");
    cmd.current_dir(fixture.path())
        .arg("status")
        .arg("--cache-root")
        .arg(fixture.cache_root())
        .assert()
        .success()
        .stdout(predicate::str::contains("widget"))
        .stdout(predicate::str::contains("no sub-projects"));

    // Listing materializes the template lazily.
    assert!(fixture.path().join("template/project.yaml").exists());
}

#[test]
fn test_status_without_config_fails() {
    let fixture = ProjectFixture::bare();

    let mut cmd = cargo_bin_cmd!("multibranch");
    cmd.current_dir(fixture.path())
        .arg("status")
        .arg("--cache-root")
        .arg(fixture.cache_root())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Could not load project"));
}
