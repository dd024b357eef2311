//! # Multibranch Library
//!
//! This library turns a single multi-branch project definition into a
//! dynamically maintained set of per-branch sub-projects, kept in sync
//! with a git repository's set of branches. It is used by the
//! `multibranch` command-line tool but can also be embedded by any
//! application that wants branch-driven project materialization behind
//! its own host adapter.
//!
//! ## Core Concepts
//!
//! - **Branch identity (`branch`)**: one branch lives in three namespaces
//!   (branch head, sub-project name, directory); `BranchNameMapper`
//!   translates between them and decides eligibility.
//! - **Registry (`registry`)**: the authoritative, lock-guarded map from
//!   branch to materialized sub-project plus the template singleton,
//!   lazily loaded from disk.
//! - **Age filter (`age_filter`)**: a pure function bounding the working
//!   set of branches by recency.
//! - **Reconciliation engine (`engine`)**: discovers, filters, diffs and
//!   then creates/deletes/resyncs sub-projects, with per-item failure
//!   isolation and an atomic in-flight guard.
//! - **Ports (`scm`, `host`, `progress`)**: narrow traits for the
//!   source-control system, the host's job objects and structured
//!   progress reporting, each with a filesystem/git default
//!   implementation.
//!
//! ## Execution Flow
//!
//! The composition root (`wiring`) assembles one project from its
//! `.multibranch.yaml`. A reconciliation run then executes:
//!
//! 1.  **Discovery**: fetch branch heads from git (preselector applied,
//!     ages recorded as a side effect).
//! 2.  **Filtering**: bound the set by `normal_count`/`max_count`/
//!     `min_age`.
//! 3.  **Diffing**: compare against the registry snapshot.
//! 4.  **Reconciliation**: create missing, delete stale, resynchronize
//!     every surviving sub-project from the template.
//! 5.  **Notification**: host update callback, then build triggers for
//!     newly created branches.

pub mod age_filter;
pub mod branch;
pub mod config;
pub mod defaults;
pub mod engine;
pub mod error;
pub mod git;
pub mod host;
pub mod lock;
pub mod preselector;
pub mod progress;
pub mod registry;
pub mod scm;
pub mod synchronizer;
pub mod wiring;

#[cfg(test)]
mod branch_proptest;
