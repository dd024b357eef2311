//! # Error Handling
//!
//! This module defines the centralized error handling mechanism for
//! `multibranch`. It uses the `thiserror` library to create a
//! comprehensive `Error` enum that covers all anticipated failure modes,
//! providing clear and descriptive error messages.
//!
//! ## Key Components
//!
//! - **`Error`**: The main enum that represents all possible errors that can
//!   occur within the application. Each variant corresponds to a specific
//!   type of error and includes contextual information to aid in debugging.
//!
//! - **`Result<T>`**: A type alias for `std::result::Result<T, Error>`, used
//!   throughout the application to simplify function signatures and ensure
//!   type safety.
//!
//! Two groups of variants matter to the reconciliation engine:
//!
//! - *Batch-fatal* errors (`LockTimeout`, `Interrupted`, `ScmFetch`) abort
//!   the current reconciliation run.
//! - *Contract* errors (`ProjectAlreadyExists`, `ProjectDoesNotExist`,
//!   `TemplateNotSynchronizable`) signal that a registry operation was
//!   invoked on a branch in the wrong state. The engine only calls these
//!   operations on disjoint diffed sets, so hitting one at runtime means a
//!   caller bug, and it is reported loudly instead of being swallowed.
//!
//! Everything else is either a configuration problem reported to the user
//! or a per-item failure that the engine isolates and logs.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Main error type for multibranch operations
#[derive(Error, Debug)]
pub enum Error {
    /// An error occurred while parsing the `.multibranch.yaml` configuration
    /// file.
    ///
    /// This error includes the specific parsing issue and optionally a hint
    /// about how to fix it.
    #[error("Configuration parsing error: {message}{}", hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    ConfigParse {
        message: String,
        /// Optional hint for how to fix the configuration issue
        hint: Option<String>,
    },

    /// A branch head, project name or directory does not follow the naming
    /// convention of this multi-branch project.
    #[error("Unsupported {kind} name: {name}")]
    UnsupportedName {
        /// Which namespace was rejected: "branch", "project" or "directory"
        kind: &'static str,
        name: String,
    },

    /// A sub-project for the branch is already registered.
    #[error("A sub-project for branch {branch} already exists")]
    ProjectAlreadyExists { branch: String },

    /// No sub-project is registered for the branch.
    #[error("There is no sub-project for branch {branch}")]
    ProjectDoesNotExist { branch: String },

    /// The template sub-project was passed to an operation that only makes
    /// sense for per-branch sub-projects.
    #[error("The template project cannot be synchronized")]
    TemplateNotSynchronizable,

    /// The SCM source did not produce a usable binding for a branch.
    ///
    /// A sub-project must always end up with a real, branch-specific SCM
    /// binding after a sync.
    #[error("No SCM binding for branch {branch}")]
    NoScmForBranch { branch: String },

    /// The registry lock could not be acquired within its bounded wait.
    #[error("{name} is still locked after waiting {}", humantime::format_duration(*waited))]
    LockTimeout { name: String, waited: Duration },

    /// The surrounding task was cancelled while a reconciliation run was in
    /// progress.
    #[error("Synchronization was interrupted")]
    Interrupted,

    /// The registry could not load its initial state from disk.
    #[error("Registry initialization failed: {message}")]
    RegistryInit { message: String },

    /// Another registry instance already manages this on-disk location.
    #[error("There is already a project handling {}", path.display())]
    PathClaimed { path: PathBuf },

    /// Branch discovery against the SCM source failed.
    ///
    /// This aborts the whole reconciliation run: branches cannot be
    /// reconciled without knowing what exists upstream.
    #[error("SCM fetch failed for {url}: {message}")]
    ScmFetch { url: String, message: String },

    /// An error occurred while executing a git command.
    #[error("Git command failed for {url}: {command} - {stderr}")]
    GitCommand {
        command: String,
        url: String,
        stderr: String,
    },

    /// A host-side operation on a sub-project delegate failed.
    #[error("Host operation error: {message}")]
    Host { message: String },

    /// A delete reported success but the sub-project directory is still
    /// present on disk. The entry is kept registered as broken.
    #[error("Directory {} has not been removed", path.display())]
    DeleteIncomplete { path: PathBuf },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A YAML parsing error, wrapped from `serde_yaml::Error`.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A regular expression error, wrapped from `regex::Error`.
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// A glob pattern error, wrapped from `glob::PatternError`.
    #[error("Glob pattern error: {0}")]
    Glob(#[from] glob::PatternError),

    /// A URL parsing error, wrapped from `url::ParseError`.
    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),
}

impl Error {
    /// Whether this error must abort the current reconciliation batch.
    ///
    /// Everything else is isolated per item: a failure for one branch does
    /// not prevent the remaining branches from being attempted.
    pub fn is_batch_fatal(&self) -> bool {
        matches!(
            self,
            Error::Interrupted | Error::LockTimeout { .. } | Error::ScmFetch { .. }
        )
    }
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
