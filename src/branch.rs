//! # Branch Identity
//!
//! One branch lives in three namespaces at once: the raw branch head name
//! in the source-control system (`feature/login`), the sanitized
//! sub-project name (`f-login`), and the sub-project's directory on disk
//! (`<subprojects>/f-login`). This module centralizes the translation
//! between all three in `BranchNameMapper`, so the namespaces cannot drift
//! apart; drifting is how orphaned directories and unreachable branches
//! happen.
//!
//! `BranchId` is the immutable product of a successful translation. It
//! carries all three names but compares, hashes and orders by the branch
//! head only, so it can serve as a sorted-set element during
//! reconciliation diffs.
//!
//! A name that does not pass the corresponding `*_supported` predicate is
//! rejected with `Error::UnsupportedName`; the reserved template name is
//! never a valid sub-project name.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Component, Path, PathBuf};

use regex::Regex;

use crate::error::{Error, Result};

/// Characters a sub-project name may consist of. Anything outside this set
/// would change under filesystem/URL encoding, which the mapper rejects.
const NAME_PATTERN: &str = r"^[A-Za-z0-9][A-Za-z0-9._-]*$";

/// Immutable identity of one branch across all three namespaces.
///
/// Equality, hashing and ordering consider the branch head only; the
/// derived project name and directory are carried along for convenience.
#[derive(Debug, Clone)]
pub struct BranchId {
    head: String,
    project_name: String,
    directory: PathBuf,
}

impl BranchId {
    /// The raw branch head name, e.g. `feature/login`.
    pub fn head(&self) -> &str {
        &self.head
    }

    /// The derived sub-project name, e.g. `f-login`.
    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    /// The sub-project directory below the sub-projects root.
    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

impl PartialEq for BranchId {
    fn eq(&self, other: &Self) -> bool {
        self.head == other.head
    }
}

impl Eq for BranchId {}

impl Hash for BranchId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.head.hash(state);
    }
}

impl PartialOrd for BranchId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BranchId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.head.cmp(&other.head)
    }
}

impl fmt::Display for BranchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.head)
    }
}

/// Translates between branch heads, sub-project names and sub-project
/// directories, and decides which names are eligible at all.
#[derive(Debug)]
pub struct BranchNameMapper {
    subprojects_root: PathBuf,
    branch_prefix: String,
    project_prefix: String,
    template_name: String,
    name_pattern: Regex,
}

impl BranchNameMapper {
    /// Creates a mapper for one multi-branch project.
    ///
    /// `subprojects_root` is the directory holding one sub-directory per
    /// branch sub-project; `template_name` is reserved and never maps to a
    /// branch.
    pub fn new(
        subprojects_root: &Path,
        branch_prefix: &str,
        project_prefix: &str,
        template_name: &str,
    ) -> Result<Self> {
        Ok(Self {
            subprojects_root: normalize(subprojects_root),
            branch_prefix: branch_prefix.to_string(),
            project_prefix: project_prefix.to_string(),
            template_name: template_name.to_string(),
            name_pattern: Regex::new(NAME_PATTERN)?,
        })
    }

    /// The directory holding all sub-project directories.
    pub fn subprojects_root(&self) -> &Path {
        &self.subprojects_root
    }

    /// Builds a `BranchId` from a sub-project name.
    pub fn from_project_name(&self, project_name: &str) -> Result<BranchId> {
        if !self.project_name_supported(project_name) {
            return Err(Error::UnsupportedName {
                kind: "project",
                name: project_name.to_string(),
            });
        }
        let head = format!(
            "{}{}",
            self.branch_prefix,
            &project_name[self.project_prefix.len()..]
        );
        Ok(self.build(head))
    }

    /// Builds a `BranchId` from a raw branch head name.
    pub fn from_branch_head(&self, head: &str) -> Result<BranchId> {
        if !self.branch_name_supported(head) {
            return Err(Error::UnsupportedName {
                kind: "branch",
                name: head.to_string(),
            });
        }
        Ok(self.build(head.to_string()))
    }

    /// Builds a `BranchId` from a sub-project directory.
    pub fn from_directory(&self, directory: &Path) -> Result<BranchId> {
        if !self.directory_supported(directory) {
            return Err(Error::UnsupportedName {
                kind: "directory",
                name: directory.display().to_string(),
            });
        }
        let name = directory
            .file_name()
            .and_then(|n| n.to_str())
            .expect("checked by directory_supported");
        self.from_project_name(name)
    }

    /// Whether a sub-project name is eligible for this project.
    ///
    /// The reserved template name is always rejected, as is any name whose
    /// filesystem encoding would differ from the raw name.
    pub fn project_name_supported(&self, project_name: &str) -> bool {
        if project_name == self.template_name {
            return false;
        }
        if !project_name.starts_with(&self.project_prefix) {
            return false;
        }
        if project_name.len() == self.project_prefix.len() {
            return false;
        }
        self.name_pattern.is_match(project_name)
    }

    /// Whether a raw branch head name is eligible for this project.
    pub fn branch_name_supported(&self, head: &str) -> bool {
        if head.is_empty() || !head.starts_with(&self.branch_prefix) {
            return false;
        }
        self.project_name_supported(&self.project_name_of(head))
    }

    /// Whether a directory is a valid sub-project directory: it must live
    /// directly below the sub-projects root and carry a supported name.
    pub fn directory_supported(&self, directory: &Path) -> bool {
        let directory = normalize(directory);
        if directory.parent() != Some(self.subprojects_root.as_path()) {
            return false;
        }
        match directory.file_name().and_then(|n| n.to_str()) {
            Some(name) => self.project_name_supported(name),
            None => false,
        }
    }

    fn project_name_of(&self, head: &str) -> String {
        format!(
            "{}{}",
            self.project_prefix,
            &head[self.branch_prefix.len()..]
        )
    }

    fn build(&self, head: String) -> BranchId {
        let project_name = self.project_name_of(&head);
        let directory = self.subprojects_root.join(&project_name);
        BranchId {
            head,
            project_name,
            directory,
        }
    }
}

/// Lexical path normalization: resolves `.` and `..` components without
/// touching the filesystem, so non-existent directories can be compared.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}
