//! End-to-end tests for the `init` command.

mod common;
use common::prelude::*;

#[test]
fn test_init_scaffolds_project() {
    let fixture = ProjectFixture::bare();

    let mut cmd = cargo_bin_cmd!("multibranch");
    cmd.current_dir(fixture.path())
        .arg("init")
        .arg("--url")
        .arg("https://github.com/acme/widget.git")
        .arg("--name")
        .arg("widget")
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized"));

    assert!(fixture.path().join(".multibranch.yaml").exists());
    assert!(fixture.path().join("template/project.yaml").exists());

    // The scaffolded config passes validation.
    let mut cmd = cargo_bin_cmd!("multibranch");
    cmd.current_dir(fixture.path())
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("widget"));
}

#[test]
fn test_init_refuses_to_overwrite() {
    let fixture = ProjectFixture::new("https://github.com/acme/widget.git");

    let mut cmd = cargo_bin_cmd!("multibranch");
    cmd.current_dir(fixture.path())
        .arg("init")
        .arg("--url")
        .arg("https://github.com/acme/other.git")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));
}

#[test]
fn test_init_force_overwrites() {
    let fixture = ProjectFixture::new("https://github.com/acme/widget.git");

    let mut cmd = cargo_bin_cmd!("multibranch");
    cmd.current_dir(fixture.path())
        .arg("init")
        .arg("--url")
        .arg("https://github.com/acme/other.git")
        .arg("--force")
        .assert()
        .success();

    let config = std::fs::read_to_string(fixture.path().join(".multibranch.yaml")).unwrap();
    assert!(config.contains("acme/other.git"));
}
