//! # Project Configuration
//!
//! This module defines the schema for the `.multibranch.yaml` file that
//! describes one multi-branch project: where its branches come from, which
//! branch names are eligible, how aggressively the working set is bounded
//! by age, and where sub-projects live on disk.
//!
//! ## Example
//!
//! ```yaml
//! name: widget
//! scm:
//!   url: https://github.com/acme/widget.git
//! branches:
//!   prefix: feature/
//!   project_prefix: f-
//!   exclude:
//!     - "feature/wip-*"
//! limits:
//!   normal_count: 10
//!   max_count: 50
//!   min_age: 24h
//!   max_age: 90d
//! ```
//!
//! All sections except `name` and `scm` are optional and fall back to the
//! defaults below. Durations accept humane strings (`30m`, `24h`, `90d`).
//!
//! Parsing reports `Error::ConfigParse` with a hint where the mistake has
//! a known fix, in the same spirit as the rest of the CLI's error output.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::defaults;
use crate::error::{Error, Result};

/// The complete definition of one multi-branch project.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Human-readable project name, used for the lock and log output.
    pub name: String,

    /// Where branches are discovered from.
    pub scm: ScmConfig,

    /// Branch naming convention and discovery-time excludes.
    #[serde(default)]
    pub branches: BranchesConfig,

    /// Bounds on the working set of branches.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// On-disk layout below the project root.
    #[serde(default)]
    pub directories: DirectoriesConfig,

    /// Name reserved for the template sub-project. No branch may map to it.
    #[serde(default = "default_template_name")]
    pub template_name: String,

    /// Per-run reconciliation log, relative to the project root.
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,

    /// Bounded wait for the registry lock.
    #[serde(default = "default_lock_timeout", with = "humantime_serde")]
    pub lock_timeout: Duration,
}

/// Source-control settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScmConfig {
    /// Repository URL. Anything the system git accepts works, including
    /// local `file://` URLs.
    pub url: Url,
}

/// Branch naming convention.
///
/// A branch is eligible when its head name starts with `prefix`; the
/// corresponding sub-project is named by replacing `prefix` with
/// `project_prefix`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BranchesConfig {
    /// Required branch head prefix, e.g. `feature/`.
    #[serde(default = "default_branch_prefix")]
    pub prefix: String,

    /// Prefix of derived sub-project names, e.g. `f-`.
    #[serde(default = "default_project_prefix")]
    pub project_prefix: String,

    /// Glob patterns of branch heads to reject during discovery.
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl Default for BranchesConfig {
    fn default() -> Self {
        Self {
            prefix: default_branch_prefix(),
            project_prefix: default_project_prefix(),
            exclude: Vec::new(),
        }
    }
}

/// Bounds on how many branches one reconciliation run will maintain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimitsConfig {
    /// Soft target for the number of sub-projects.
    #[serde(default)]
    pub normal_count: Option<usize>,

    /// Hard ceiling that is never exceeded.
    #[serde(default)]
    pub max_count: Option<usize>,

    /// Grace period: branches younger than this are kept beyond
    /// `normal_count` (but never beyond `max_count`).
    #[serde(default, with = "humantime_serde")]
    pub min_age: Option<Duration>,

    /// Branches whose last change is older than this are rejected during
    /// discovery and never reach the registry.
    #[serde(default, with = "humantime_serde")]
    pub max_age: Option<Duration>,
}

/// On-disk layout of one multi-branch project, relative to its root.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DirectoriesConfig {
    /// Directory holding one sub-directory per branch sub-project.
    #[serde(default = "default_subprojects_dir")]
    pub subprojects: PathBuf,

    /// Directory of the template sub-project.
    #[serde(default = "default_template_dir")]
    pub template: PathBuf,
}

impl Default for DirectoriesConfig {
    fn default() -> Self {
        Self {
            subprojects: default_subprojects_dir(),
            template: default_template_dir(),
        }
    }
}

fn default_template_name() -> String {
    "template".to_string()
}

fn default_log_file() -> PathBuf {
    PathBuf::from("sync.log")
}

fn default_lock_timeout() -> Duration {
    defaults::LOCK_TIMEOUT
}

fn default_branch_prefix() -> String {
    "feature/".to_string()
}

fn default_project_prefix() -> String {
    "f-".to_string()
}

fn default_subprojects_dir() -> PathBuf {
    PathBuf::from("branches")
}

fn default_template_dir() -> PathBuf {
    PathBuf::from("template")
}

/// Parses a YAML string into a `ProjectConfig` and validates it.
pub fn parse(yaml_content: &str) -> Result<ProjectConfig> {
    let config: ProjectConfig =
        serde_yaml::from_str(yaml_content).map_err(|e| Error::ConfigParse {
            message: e.to_string(),
            hint: hint_for_yaml_error(&e.to_string()),
        })?;
    config.validate()?;
    Ok(config)
}

/// Parse a `ProjectConfig` from a YAML file path.
pub fn from_file<P: AsRef<Path>>(path: P) -> Result<ProjectConfig> {
    let content = std::fs::read_to_string(path).map_err(Error::Io)?;
    parse(&content)
}

fn hint_for_yaml_error(message: &str) -> Option<String> {
    if message.contains("missing field `scm`") {
        Some("Add an 'scm:' block with a 'url:' entry".to_string())
    } else if message.contains("missing field `url`") {
        Some("Add 'url:' to the scm block".to_string())
    } else if message.contains("missing field `name`") {
        Some("Add a top-level 'name:' entry".to_string())
    } else if message.contains("unknown field") {
        Some("Check the field name against the documented schema".to_string())
    } else {
        None
    }
}

impl ProjectConfig {
    /// Semantic validation beyond what serde can express.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::ConfigParse {
                message: "Project name must not be empty".to_string(),
                hint: None,
            });
        }
        if !self.branches.prefix.ends_with('/') {
            return Err(Error::ConfigParse {
                message: format!(
                    "Branch prefix \"{}\" must end with '/'",
                    self.branches.prefix
                ),
                hint: Some("Use a ref namespace such as 'feature/'".to_string()),
            });
        }
        if self.branches.project_prefix.is_empty() {
            return Err(Error::ConfigParse {
                message: "Project prefix must not be empty".to_string(),
                hint: Some("A short marker such as 'f-' keeps generated names recognizable".to_string()),
            });
        }
        if self.template_name.is_empty() {
            return Err(Error::ConfigParse {
                message: "Template name must not be empty".to_string(),
                hint: None,
            });
        }
        if let (Some(normal), Some(max)) = (self.limits.normal_count, self.limits.max_count) {
            if normal > max {
                return Err(Error::ConfigParse {
                    message: format!(
                        "limits.normal_count ({}) exceeds limits.max_count ({})",
                        normal, max
                    ),
                    hint: Some("The hard ceiling must be at least the soft target".to_string()),
                });
            }
        }
        // Surface bad exclude patterns at load time, not mid-discovery.
        for pattern in &self.branches.exclude {
            glob::Pattern::new(pattern)?;
        }
        Ok(())
    }

    /// Absolute directory of the sub-projects root for a project rooted at
    /// `root`.
    pub fn subprojects_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.directories.subprojects)
    }

    /// Absolute directory of the template sub-project for a project rooted
    /// at `root`.
    pub fn template_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.directories.template)
    }

    /// Absolute path of the per-run log file for a project rooted at `root`.
    pub fn log_path(&self, root: &Path) -> PathBuf {
        root.join(&self.log_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
name: widget
scm:
  url: https://github.com/acme/widget.git
"#;

    #[test]
    fn test_parse_minimal_config_applies_defaults() {
        let config = parse(MINIMAL).unwrap();
        assert_eq!(config.name, "widget");
        assert_eq!(config.branches.prefix, "feature/");
        assert_eq!(config.branches.project_prefix, "f-");
        assert_eq!(config.template_name, "template");
        assert_eq!(config.directories.subprojects, PathBuf::from("branches"));
        assert_eq!(config.directories.template, PathBuf::from("template"));
        assert_eq!(config.lock_timeout, Duration::from_secs(60));
        assert!(config.limits.normal_count.is_none());
        assert!(config.limits.max_count.is_none());
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
name: widget
scm:
  url: https://github.com/acme/widget.git
branches:
  prefix: topic/
  project_prefix: t-
  exclude:
    - "topic/wip-*"
limits:
  normal_count: 10
  max_count: 50
  min_age: 24h
  max_age: 90d
template_name: seed
log_file: logs/sync.log
lock_timeout: 30s
"#;
        let config = parse(yaml).unwrap();
        assert_eq!(config.branches.prefix, "topic/");
        assert_eq!(config.branches.project_prefix, "t-");
        assert_eq!(config.branches.exclude, vec!["topic/wip-*"]);
        assert_eq!(config.limits.normal_count, Some(10));
        assert_eq!(config.limits.max_count, Some(50));
        assert_eq!(config.limits.min_age, Some(Duration::from_secs(24 * 3600)));
        assert_eq!(
            config.limits.max_age,
            Some(Duration::from_secs(90 * 24 * 3600))
        );
        assert_eq!(config.template_name, "seed");
        assert_eq!(config.lock_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_parse_missing_scm_has_hint() {
        let err = parse("name: widget\n").unwrap_err();
        let display = format!("{}", err);
        assert!(display.contains("Configuration parsing error"));
        assert!(display.contains("hint:"));
        assert!(display.contains("scm"));
    }

    #[test]
    fn test_parse_unknown_field_rejected() {
        let yaml = r#"
name: widget
scm:
  url: https://github.com/acme/widget.git
surprise: true
"#;
        let err = parse(yaml).unwrap_err();
        assert!(format!("{}", err).contains("unknown field"));
    }

    #[test]
    fn test_validate_prefix_must_end_with_slash() {
        let yaml = r#"
name: widget
scm:
  url: https://github.com/acme/widget.git
branches:
  prefix: feature
"#;
        let err = parse(yaml).unwrap_err();
        assert!(format!("{}", err).contains("must end with '/'"));
    }

    #[test]
    fn test_validate_normal_count_above_max_count() {
        let yaml = r#"
name: widget
scm:
  url: https://github.com/acme/widget.git
limits:
  normal_count: 60
  max_count: 50
"#;
        let err = parse(yaml).unwrap_err();
        assert!(format!("{}", err).contains("exceeds"));
    }

    #[test]
    fn test_validate_bad_exclude_pattern() {
        let yaml = r#"
name: widget
scm:
  url: https://github.com/acme/widget.git
branches:
  exclude: ["feature/[broken"]
"#;
        assert!(parse(yaml).is_err());
    }

    #[test]
    fn test_directory_helpers_join_root() {
        let config = parse(MINIMAL).unwrap();
        let root = Path::new("/srv/projects/widget");
        assert_eq!(
            config.subprojects_dir(root),
            PathBuf::from("/srv/projects/widget/branches")
        );
        assert_eq!(
            config.template_dir(root),
            PathBuf::from("/srv/projects/widget/template")
        );
        assert_eq!(
            config.log_path(root),
            PathBuf::from("/srv/projects/widget/sync.log")
        );
    }

    #[test]
    fn test_from_file_nonexistent() {
        let result = from_file("nonexistent_file.yaml");
        assert!(result.is_err());
    }
}
