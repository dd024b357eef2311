//! # Source-Control Port
//!
//! This module defines the boundary between the reconciliation engine and
//! the source-control system. It is designed around a trait so that the
//! concrete implementation can be swapped out, which is particularly
//! useful for testing: the engine's tests drive reconciliation against an
//! in-memory source instead of a real repository.
//!
//! ## Key Components
//!
//! - **`BranchHead`**: one discovered branch, carrying its raw head name plus the
//!   last-change timestamp when the source knows it.
//! - **`ScmBinding`**: a concrete, branch-specific checkout binding that a
//!   sub-project is configured with after a sync. There is deliberately no
//!   placeholder value; `ScmSource::build` returns `None` when it cannot
//!   produce a real binding, and the synchronizer turns that into
//!   `Error::NoScmForBranch`.
//! - **`ScmSource`**: the discovery/build port. `fetch` may perform
//!   network I/O and its failure aborts a reconciliation run.
//! - **`BranchPreselector`**: a discovery-side predicate consulted per
//!   candidate branch, before the engine ever sees it.
//!
//! The production implementation is `GitScmSource`, which maintains a
//! mirror clone through the system `git` binary (see the `git` module).

use std::path::PathBuf;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::Result;
use crate::git;
use crate::progress::ProgressSink;

/// One branch as reported by the source-control system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchHead {
    name: String,
    last_change: Option<SystemTime>,
}

impl BranchHead {
    /// Creates a head with a known last-change time.
    pub fn new(name: &str, last_change: SystemTime) -> Self {
        Self {
            name: name.to_string(),
            last_change: Some(last_change),
        }
    }

    /// Creates a head whose last-change time is unknown.
    pub fn without_age(name: &str) -> Self {
        Self {
            name: name.to_string(),
            last_change: None,
        }
    }

    /// The raw branch head name, e.g. `feature/login`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// When the branch last changed, if the source knows.
    pub fn last_change(&self) -> Option<SystemTime> {
        self.last_change
    }
}

/// A real, branch-specific source-control binding for one sub-project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScmBinding {
    /// Repository URL.
    pub url: Url,
    /// Branch head the sub-project checks out.
    pub branch: String,
}

/// Discovery-side predicate applied to every candidate branch.
///
/// Rejections are reported through the sink with a reason; discovery
/// continues with the remaining branches.
pub trait BranchPreselector: Send + Sync {
    fn accept(&self, head: &BranchHead, sink: &dyn ProgressSink) -> bool;
}

/// The source-control port of the reconciliation engine.
pub trait ScmSource: Send + Sync {
    /// Discovers the current set of branches.
    ///
    /// May perform network I/O. A failure here aborts the whole
    /// reconciliation run, since branches cannot be reconciled without knowing
    /// what exists upstream.
    fn fetch(&self, sink: &dyn ProgressSink) -> Result<Vec<BranchHead>>;

    /// Builds the branch-specific binding for a head name, or `None` when
    /// no real binding can be produced.
    fn build(&self, head: &str) -> Option<ScmBinding>;

    /// Description of the source for log output.
    fn describe(&self) -> String;
}

/// `ScmSource` backed by a mirror clone maintained with the system `git`.
pub struct GitScmSource {
    url: Url,
    mirror: PathBuf,
    preselector: Option<Box<dyn BranchPreselector>>,
}

impl GitScmSource {
    /// Creates a source for `url`, mirroring it below `cache_root`.
    pub fn new(url: Url, cache_root: &std::path::Path) -> Self {
        let mirror = git::mirror_path(cache_root, url.as_str());
        Self {
            url,
            mirror,
            preselector: None,
        }
    }

    /// Installs a discovery-side preselector.
    pub fn with_preselector(mut self, preselector: Box<dyn BranchPreselector>) -> Self {
        self.preselector = Some(preselector);
        self
    }
}

impl ScmSource for GitScmSource {
    fn fetch(&self, sink: &dyn ProgressSink) -> Result<Vec<BranchHead>> {
        git::update_mirror(self.url.as_str(), &self.mirror)?;
        let heads = git::list_heads(self.url.as_str(), &self.mirror)?;
        let mut accepted = Vec::with_capacity(heads.len());
        for (name, last_change) in heads {
            let head = BranchHead::new(&name, last_change);
            match &self.preselector {
                Some(preselector) if !preselector.accept(&head, sink) => {}
                _ => accepted.push(head),
            }
        }
        Ok(accepted)
    }

    fn build(&self, head: &str) -> Option<ScmBinding> {
        Some(ScmBinding {
            url: self.url.clone(),
            branch: head.to_string(),
        })
    }

    fn describe(&self) -> String {
        self.url.to_string()
    }
}
