//! # Host Ports and the Filesystem Host
//!
//! The original system this design comes from runs inside a CI server and
//! manipulates that server's job objects. Here the core depends only on
//! narrow capability ports, and a thin adapter can bridge them to any
//! host:
//!
//! - **`ProjectHandle`**: the opaque per-sub-project job object. The core
//!   never looks inside it; it only invokes the operations the registry
//!   and synchronizer need.
//! - **`DelegateFactory`**: creates or loads handles. Invoked under the
//!   registry lock, so implementations must not schedule or trigger
//!   anything beyond constructing the job representation.
//! - **`HostPort`**: run-scoped host services: entering the privileged
//!   system scope for the duration of a reconciliation (restored when the
//!   returned guard drops) and the once-per-run update notification after
//!   structural changes.
//!
//! The default implementation is a filesystem host: every sub-project is a
//! directory holding a `project.yaml` (the persisted `ProjectSpec`), and
//! build requests are appended to a per-project file. This keeps the whole
//! engine exercisable standalone and gives tests a realistic host.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use log::debug;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::defaults::PROJECT_FILE_NAME;
use crate::error::{Error, Result};
use crate::scm::ScmBinding;

/// The persisted configuration of one sub-project (or the template).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectSpec {
    /// Sub-project name. Always matches the directory name.
    pub name: String,

    /// Whether the project may build. The template is never enabled.
    #[serde(default)]
    pub enabled: bool,

    /// Branch-specific checkout binding. The template has none.
    #[serde(default)]
    pub scm: Option<ScmBinding>,

    /// Workspace override propagated from the template.
    #[serde(default)]
    pub custom_workspace: Option<PathBuf>,

    /// Build steps, copied verbatim from the template.
    #[serde(default)]
    pub steps: Vec<String>,
}

impl ProjectSpec {
    /// A fresh, disabled spec with no SCM binding.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            enabled: false,
            scm: None,
            custom_workspace: None,
            steps: Vec::new(),
        }
    }
}

/// Opaque host job object for one sub-project.
///
/// Owned and mutated by the host; the core only drives it through these
/// operations.
pub trait ProjectHandle: Send + Sync {
    /// The sub-project name.
    fn name(&self) -> String;

    /// Current persisted configuration.
    fn config(&self) -> Result<ProjectSpec>;

    /// Replaces the persisted configuration with the template's.
    ///
    /// The handle's own name and enabled-state survive the overwrite; the
    /// branch-specific SCM binding is re-applied separately afterwards.
    fn overwrite_config(&self, template: &ProjectSpec) -> Result<()>;

    /// Sets (or clears) the SCM binding.
    fn set_scm(&self, binding: Option<ScmBinding>) -> Result<()>;

    /// Enables or disables the project.
    fn set_enabled(&self, enabled: bool) -> Result<()>;

    /// Sets the workspace override.
    fn set_custom_workspace(&self, workspace: Option<PathBuf>) -> Result<()>;

    /// Re-registers the project with the host's loading machinery so
    /// caches and indexes pick up the new configuration.
    fn reload(&self, parent: &str) -> Result<()>;

    /// Deletes the project's on-disk state.
    fn delete(&self) -> Result<()>;

    /// Requests a build with the given cause.
    fn schedule_build(&self, cause: &str) -> Result<()>;
}

/// Creates and loads `ProjectHandle`s.
///
/// Called under the registry lock: implementations must be side-effect
/// free beyond constructing the in-memory/on-disk job representation.
pub trait DelegateFactory: Send + Sync {
    /// Creates a fresh job representation at `directory`.
    fn create(&self, name: &str, directory: &Path) -> Result<Arc<dyn ProjectHandle>>;

    /// Loads an existing job representation from `directory`.
    fn load(&self, name: &str, directory: &Path) -> Result<Arc<dyn ProjectHandle>>;
}

/// Marker for an entered system-privilege scope; dropping it restores the
/// previous identity.
pub trait SystemScope: Send {}

/// Run-scoped host services used by the reconciliation engine.
pub trait HostPort: Send + Sync {
    /// Enters the system-privilege scope required for modifying projects.
    fn enter_system_scope(&self) -> Box<dyn SystemScope>;

    /// Tells the host that dependency/scheduling state may have changed.
    fn update(&self);
}

/// Filesystem-backed `DelegateFactory`: each sub-project is a directory
/// with a `project.yaml` inside.
pub struct FsDelegateFactory;

impl DelegateFactory for FsDelegateFactory {
    fn create(&self, name: &str, directory: &Path) -> Result<Arc<dyn ProjectHandle>> {
        fs::create_dir_all(directory)?;
        let handle = FsProjectHandle {
            name: name.to_string(),
            directory: directory.to_path_buf(),
            spec: Mutex::new(ProjectSpec::new(name)),
        };
        handle.persist()?;
        Ok(Arc::new(handle))
    }

    fn load(&self, name: &str, directory: &Path) -> Result<Arc<dyn ProjectHandle>> {
        let spec = read_spec(&directory.join(PROJECT_FILE_NAME))?;
        Ok(Arc::new(FsProjectHandle {
            name: name.to_string(),
            directory: directory.to_path_buf(),
            spec: Mutex::new(spec),
        }))
    }
}

fn read_spec(path: &Path) -> Result<ProjectSpec> {
    let content = fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&content)?)
}

/// Filesystem-backed job object.
pub struct FsProjectHandle {
    name: String,
    directory: PathBuf,
    spec: Mutex<ProjectSpec>,
}

impl FsProjectHandle {
    fn persist(&self) -> Result<()> {
        let spec = self.spec.lock();
        let yaml = serde_yaml::to_string(&*spec)?;
        fs::write(self.directory.join(PROJECT_FILE_NAME), yaml)?;
        Ok(())
    }

    fn mutate<F>(&self, mutation: F) -> Result<()>
    where
        F: FnOnce(&mut ProjectSpec),
    {
        {
            let mut spec = self.spec.lock();
            mutation(&mut spec);
        }
        self.persist()
    }
}

impl ProjectHandle for FsProjectHandle {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn config(&self) -> Result<ProjectSpec> {
        Ok(self.spec.lock().clone())
    }

    fn overwrite_config(&self, template: &ProjectSpec) -> Result<()> {
        self.mutate(|spec| {
            let name = spec.name.clone();
            let enabled = spec.enabled;
            *spec = template.clone();
            spec.name = name;
            spec.enabled = enabled;
        })
    }

    fn set_scm(&self, binding: Option<ScmBinding>) -> Result<()> {
        self.mutate(|spec| spec.scm = binding)
    }

    fn set_enabled(&self, enabled: bool) -> Result<()> {
        self.mutate(|spec| spec.enabled = enabled)
    }

    fn set_custom_workspace(&self, workspace: Option<PathBuf>) -> Result<()> {
        self.mutate(|spec| spec.custom_workspace = workspace)
    }

    fn reload(&self, parent: &str) -> Result<()> {
        // Re-reading the persisted file is this host's loading machinery;
        // it also verifies the file is still parseable.
        let spec = read_spec(&self.directory.join(PROJECT_FILE_NAME))?;
        *self.spec.lock() = spec;
        debug!("Reloaded {} under {}.", self.name, parent);
        Ok(())
    }

    fn delete(&self) -> Result<()> {
        fs::remove_dir_all(&self.directory).map_err(|e| Error::Host {
            message: format!(
                "Could not delete {}: {}",
                self.directory.display(),
                e
            ),
        })
    }

    fn schedule_build(&self, cause: &str) -> Result<()> {
        let stamp = humantime::format_rfc3339_seconds(SystemTime::now());
        let line = format!("{} {}\n", stamp, cause);
        let path = self.directory.join("build-requests.log");
        let mut content = fs::read_to_string(&path).unwrap_or_default();
        content.push_str(&line);
        fs::write(&path, content)?;
        Ok(())
    }
}

/// The filesystem host: no real privilege model, so the system scope only
/// marks the run in the log; `update` is the standalone no-op.
pub struct FsHost;

struct FsSystemScope;

impl SystemScope for FsSystemScope {}

impl Drop for FsSystemScope {
    fn drop(&mut self) {
        debug!("Left system scope.");
    }
}

impl HostPort for FsHost {
    fn enter_system_scope(&self) -> Box<dyn SystemScope> {
        debug!("Entered system scope.");
        Box::new(FsSystemScope)
    }

    fn update(&self) {
        debug!("Host update notification.");
    }
}
