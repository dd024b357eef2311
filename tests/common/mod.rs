//! Shared test utilities for integration and E2E tests.
//!
//! This module provides common fixtures and helper functions to reduce
//! duplication across test files.
//!
//! ## Usage
//!
//! Add `mod common;` to your test file, then use the helpers:
//!
//! ```rust,ignore
//! mod common;
//! use common::prelude::*;
//!
//! #[test]
//! fn test_example() {
//!     let fixture = ProjectFixture::new("https://example.com/repo.git");
//!     // ... test code
//! }
//! ```

use std::path::{Path, PathBuf};
use std::process::Command;

use assert_fs::prelude::*;
use assert_fs::TempDir;

/// Re-export commonly used test dependencies for convenience.
pub mod prelude {
    pub use assert_cmd::cargo::cargo_bin_cmd;
    pub use assert_fs::prelude::*;
    #[allow(unused_imports)]
    pub use assert_fs::TempDir;
    pub use predicates::prelude::*;

    #[allow(unused_imports)]
    pub use super::git_available;
    #[allow(unused_imports)]
    pub use super::GitFixture;
    pub use super::ProjectFixture;
}

/// Common configuration YAML snippets for testing.
#[allow(dead_code)]
pub mod configs {
    /// Minimal valid configuration.
    pub const MINIMAL: &str = r#"
name: widget
scm:
  url: https://github.com/acme/widget.git
"#;

    /// Configuration with limits and excludes.
    pub const BOUNDED: &str = r#"
name: widget
scm:
  url: https://github.com/acme/widget.git
branches:
  exclude:
    - "feature/wip-*"
limits:
  normal_count: 5
  max_count: 10
  min_age: 24h
"#;
}

/// A temp directory laid out as a multi-branch project root.
pub struct ProjectFixture {
    temp: TempDir,
}

#[allow(dead_code)]
impl ProjectFixture {
    /// Creates a project root with a `.multibranch.yaml` pointing at
    /// `url`.
    pub fn new(url: &str) -> Self {
        let temp = TempDir::new().unwrap();
        let config = format!(
            "name: widget\nscm:\n  url: {}\n",
            url
        );
        temp.child(".multibranch.yaml").write_str(&config).unwrap();
        Self { temp }
    }

    /// Creates an empty temp directory without a configuration.
    pub fn bare() -> Self {
        Self {
            temp: TempDir::new().unwrap(),
        }
    }

    /// Replaces the configuration file content.
    pub fn write_config(&self, content: &str) {
        self.temp
            .child(".multibranch.yaml")
            .write_str(content)
            .unwrap();
    }

    pub fn path(&self) -> &Path {
        self.temp.path()
    }

    /// The cache directory tests pass as `--cache-root`.
    pub fn cache_root(&self) -> PathBuf {
        self.temp.path().join("cache")
    }
}

/// Whether the system git binary is usable.
#[allow(dead_code)]
pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}

/// A local git repository with controllable branches, used as the
/// upstream for sync E2E tests.
#[allow(dead_code)]
pub struct GitFixture {
    temp: TempDir,
}

#[allow(dead_code)]
impl GitFixture {
    /// Initializes a repository with one commit on `main`.
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let fixture = Self { temp };
        fixture.git(&["init", "--initial-branch=main"]);
        std::fs::write(fixture.path().join("README.md"), "fixture").unwrap();
        fixture.git(&["add", "."]);
        fixture.commit("initial");
        fixture
    }

    /// Creates `branch` pointing at a fresh commit.
    pub fn add_branch(&self, branch: &str) {
        self.git(&["checkout", "-b", branch, "main"]);
        std::fs::write(
            self.path().join(format!("{}.txt", branch.replace('/', "-"))),
            branch,
        )
        .unwrap();
        self.git(&["add", "."]);
        self.commit(&format!("work on {}", branch));
        self.git(&["checkout", "main"]);
    }

    /// Deletes `branch`.
    pub fn remove_branch(&self, branch: &str) {
        self.git(&["branch", "-D", branch]);
    }

    /// A `file://` URL for this repository.
    pub fn url(&self) -> String {
        format!("file://{}", self.path().display())
    }

    pub fn path(&self) -> &Path {
        self.temp.path()
    }

    fn commit(&self, message: &str) {
        self.git(&[
            "-c",
            "user.name=fixture",
            "-c",
            "user.email=fixture@example.com",
            "commit",
            "-m",
            message,
        ]);
    }

    fn git(&self, args: &[&str]) {
        let output = Command::new("git")
            .args(args)
            .current_dir(self.path())
            .env("GIT_TERMINAL_PROMPT", "0")
            .output()
            .expect("failed to run git");
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }
}
