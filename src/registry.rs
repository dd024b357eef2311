//! # Sub-Project Registry
//!
//! The authoritative, lock-guarded map from branch identity to
//! materialized sub-project, plus the template singleton and the
//! best-effort age side-map used by the branch filter.
//!
//! ## Concurrency discipline
//!
//! Every operation acquires the registry's single `DiagnosticLock` before
//! touching any state. The design deliberately serializes all mutation of
//! one multi-branch project's sub-project set, accepting coarse-grained
//! contention in exchange for eliminating races between concurrent
//! creates/deletes of the same branch.
//!
//! ## Lifecycle
//!
//! The registry is created empty and lazily loads its contents from the
//! on-disk layout on first use, inside the held lock. `ensure_initialized`
//! marks itself initialized *before* loading so a recursive call during
//! the load cannot start a second load; the mark is rolled back if the
//! load fails. Per-directory load failures are logged and skip that
//! branch for the run; a directory without a project file is corrupt and
//! is removed.
//!
//! ## Failure semantics
//!
//! A delete removes the entry from the map *before* invoking host-level
//! deletion (blocking re-entrant deletion callbacks), and if the deletion
//! does not fully remove the on-disk state the entry is re-inserted marked
//! broken. Broken entries are never silently replaced: creating the same
//! branch again fails with `ProjectAlreadyExists` until an operator
//! intervenes.
//!
//! One registry instance per on-disk root is enforced through the
//! explicit `PathClaims` owned by the composition root.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use log::{debug, error, info, warn};
use parking_lot::Mutex;

use crate::branch::{BranchId, BranchNameMapper};
use crate::defaults::PROJECT_FILE_NAME;
use crate::error::{Error, Result};
use crate::host::{DelegateFactory, ProjectHandle};
use crate::lock::DiagnosticLock;

/// Receives branch last-change times as branches are discovered.
///
/// This is the side channel through which the registry learns ages
/// outside of a reconciliation run; losing an entry only degrades
/// age-based filtering, never correctness.
pub trait BranchAgeListener: Send + Sync {
    fn register_last_change(&self, branch: &BranchId, last_change: SystemTime);
}

/// One materialized sub-project: either the singleton template or a
/// per-branch instance.
///
/// Values handed out by the registry are point-in-time snapshots; the
/// registry's own copy is the source of truth for `broken` and
/// `last_scm_change`.
#[derive(Clone)]
pub struct SubProject {
    branch: Option<BranchId>,
    name: String,
    root_dir: PathBuf,
    delegate: Arc<dyn ProjectHandle>,
    last_change: Option<SystemTime>,
    broken: bool,
}

impl SubProject {
    /// The sub-project name (equals the directory name).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The branch this sub-project is bound to; `None` iff template.
    pub fn branch(&self) -> Option<&BranchId> {
        self.branch.as_ref()
    }

    /// Whether this is the template sub-project.
    pub fn is_template(&self) -> bool {
        self.branch.is_none()
    }

    /// The sub-project's directory.
    pub fn root_directory(&self) -> &Path {
        &self.root_dir
    }

    /// The opaque host job object.
    pub fn delegate(&self) -> &Arc<dyn ProjectHandle> {
        &self.delegate
    }

    /// Last known SCM change of the bound branch.
    pub fn last_scm_change(&self) -> Option<SystemTime> {
        self.last_change
    }

    /// Whether a delete partially failed for this sub-project. Broken
    /// entries require operator intervention and are never replaced.
    pub fn is_broken(&self) -> bool {
        self.broken
    }
}

impl PartialEq for SubProject {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for SubProject {}

impl PartialOrd for SubProject {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SubProject {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.name.cmp(&other.name)
    }
}

impl fmt::Display for SubProject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl fmt::Debug for SubProject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubProject")
            .field("name", &self.name)
            .field("branch", &self.branch)
            .field("root_dir", &self.root_dir)
            .field("broken", &self.broken)
            .finish_non_exhaustive()
    }
}

/// Process-wide record of which on-disk roots already have a registry.
///
/// Owned by the composition root and passed in at construction; prevents
/// two independent registries from racing on the same filesystem
/// location.
#[derive(Clone, Default)]
pub struct PathClaims {
    claimed: Arc<Mutex<HashSet<PathBuf>>>,
}

impl PathClaims {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `path`, failing if it is already claimed. The claim is
    /// released when the returned token drops.
    pub fn claim(&self, path: &Path) -> Result<PathClaim> {
        let mut claimed = self.claimed.lock();
        if !claimed.insert(path.to_path_buf()) {
            return Err(Error::PathClaimed {
                path: path.to_path_buf(),
            });
        }
        Ok(PathClaim {
            path: path.to_path_buf(),
            claimed: Arc::clone(&self.claimed),
        })
    }
}

/// Token for one claimed root; releases the claim on drop.
pub struct PathClaim {
    path: PathBuf,
    claimed: Arc<Mutex<HashSet<PathBuf>>>,
}

impl Drop for PathClaim {
    fn drop(&mut self) {
        self.claimed.lock().remove(&self.path);
    }
}

struct RegistryState {
    projects: HashMap<BranchId, SubProject>,
    template: Option<SubProject>,
    ages: HashMap<BranchId, SystemTime>,
    initialized: bool,
}

/// The keyed collection `BranchId -> SubProject` for one multi-branch
/// project.
pub struct SubProjectRegistry {
    parent_name: String,
    subprojects_dir: PathBuf,
    template_dir: PathBuf,
    template_name: String,
    mapper: Arc<BranchNameMapper>,
    delegates: Box<dyn DelegateFactory>,
    state: DiagnosticLock<RegistryState>,
    _claim: PathClaim,
}

impl SubProjectRegistry {
    /// Creates the registry for the project rooted at `root_dir`.
    ///
    /// Claims `root_dir` in `claims`; fails if another registry already
    /// handles it. No disk access happens here; contents load lazily on
    /// first use.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        parent_name: &str,
        root_dir: &Path,
        subprojects_dir: PathBuf,
        template_dir: PathBuf,
        template_name: &str,
        mapper: Arc<BranchNameMapper>,
        delegates: Box<dyn DelegateFactory>,
        lock_timeout: Duration,
        claims: &PathClaims,
    ) -> Result<Self> {
        let claim = claims.claim(root_dir)?;
        Ok(Self {
            parent_name: parent_name.to_string(),
            subprojects_dir,
            template_dir,
            template_name: template_name.to_string(),
            mapper,
            delegates,
            state: DiagnosticLock::new(
                parent_name,
                lock_timeout,
                RegistryState {
                    projects: HashMap::new(),
                    template: None,
                    ages: HashMap::new(),
                    initialized: false,
                },
            ),
            _claim: claim,
        })
    }

    /// Snapshot of all registered sub-projects, template excluded, sorted
    /// by name.
    pub fn get_projects(&self) -> Result<BTreeSet<SubProject>> {
        let mut state = self.state.lock()?;
        self.ensure_initialized(&mut state)?;
        Ok(state.projects.values().cloned().collect())
    }

    /// Snapshot of all registered branches, sorted.
    pub fn get_branches(&self) -> Result<BTreeSet<BranchId>> {
        let mut state = self.state.lock()?;
        self.ensure_initialized(&mut state)?;
        Ok(state.projects.keys().cloned().collect())
    }

    /// Snapshot of all delegates, sorted by sub-project name.
    pub fn get_delegates(&self) -> Result<Vec<Arc<dyn ProjectHandle>>> {
        Ok(self
            .get_projects()?
            .iter()
            .map(|project| Arc::clone(project.delegate()))
            .collect())
    }

    /// The sub-project for `branch`, or `ProjectDoesNotExist`.
    pub fn get_project(&self, branch: &BranchId) -> Result<SubProject> {
        self.get_optional_project(branch)?
            .ok_or_else(|| Error::ProjectDoesNotExist {
                branch: branch.head().to_string(),
            })
    }

    /// The sub-project for `branch`, if registered.
    pub fn get_optional_project(&self, branch: &BranchId) -> Result<Option<SubProject>> {
        let mut state = self.state.lock()?;
        self.ensure_initialized(&mut state)?;
        Ok(state.projects.get(branch).cloned())
    }

    /// Materializes a new sub-project for `branch` and registers it.
    ///
    /// Fails with `ProjectAlreadyExists` if the branch is already
    /// registered (broken entries included) or its directory is already
    /// occupied on disk.
    pub fn create_new_sub_project(&self, branch: &BranchId) -> Result<SubProject> {
        let mut state = self.state.lock()?;
        self.ensure_initialized(&mut state)?;
        if state.projects.contains_key(branch) {
            return Err(Error::ProjectAlreadyExists {
                branch: branch.head().to_string(),
            });
        }
        let directory = branch.directory().to_path_buf();
        if directory.exists() {
            return Err(Error::ProjectAlreadyExists {
                branch: branch.head().to_string(),
            });
        }
        let delegate = self.delegates.create(branch.project_name(), &directory)?;
        let project = SubProject {
            branch: Some(branch.clone()),
            name: branch.project_name().to_string(),
            root_dir: directory,
            delegate,
            last_change: state.ages.get(branch).copied(),
            broken: false,
        };
        state.projects.insert(branch.clone(), project.clone());
        info!(
            "Created new project {} in directory {}.",
            project,
            project.root_directory().display()
        );
        Ok(project)
    }

    /// The template sub-project, loaded from disk if present, created
    /// fresh otherwise, cached thereafter.
    pub fn get_template_project(&self) -> Result<SubProject> {
        let mut state = self.state.lock()?;
        self.ensure_initialized(&mut state)?;
        self.template_project(&mut state)
    }

    /// Deletes the sub-project for `branch`.
    ///
    /// The entry leaves the map before host-level deletion runs. If the
    /// deletion fails or leaves the directory behind, the entry is
    /// re-inserted marked broken and the error is returned.
    pub fn delete(&self, branch: &BranchId) -> Result<()> {
        let mut state = self.state.lock()?;
        self.ensure_initialized(&mut state)?;
        // Remove first to block recursive deletion callbacks:
        let mut project =
            state
                .projects
                .remove(branch)
                .ok_or_else(|| Error::ProjectDoesNotExist {
                    branch: branch.head().to_string(),
                })?;
        let outcome = delete_fully(&project);
        match outcome {
            Ok(()) => {
                info!(
                    "Deleted and removed project {} (directory {}).",
                    project,
                    project.root_directory().display()
                );
                Ok(())
            }
            Err(e) => {
                // Keep tracking the project if deletion did not work:
                project.broken = true;
                state.projects.insert(branch.clone(), project);
                Err(e)
            }
        }
    }

    /// Records the last-change time of `branch` and propagates it to the
    /// live sub-project if one exists.
    pub fn register_last_change_checked(
        &self,
        branch: &BranchId,
        last_change: SystemTime,
    ) -> Result<()> {
        let mut state = self.state.lock()?;
        self.ensure_initialized(&mut state)?;
        state.ages.insert(branch.clone(), last_change);
        if let Some(project) = state.projects.get_mut(branch) {
            project.last_change = Some(last_change);
        }
        debug!("Registered last change of {}.", branch);
        Ok(())
    }

    /// The recorded last-change time of `branch`, if known.
    pub fn get_last_change(&self, branch: &BranchId) -> Result<Option<SystemTime>> {
        let mut state = self.state.lock()?;
        self.ensure_initialized(&mut state)?;
        let last_change = state.ages.get(branch).copied();
        if last_change.is_none() {
            warn!("Last change date of {} unknown.", branch);
        }
        Ok(last_change)
    }

    fn ensure_initialized(
        &self,
        state: &mut RegistryState,
    ) -> Result<()> {
        if state.initialized {
            return Ok(());
        }
        info!("Initializing registry of {}.", self.parent_name);
        // Set this now to prevent recursion during the load itself.
        state.initialized = true;
        match self.load_from_disk(state) {
            Ok(()) => Ok(()),
            Err(e) => {
                state.initialized = false;
                Err(Error::RegistryInit {
                    message: e.to_string(),
                })
            }
        }
    }

    fn load_from_disk(&self, state: &mut RegistryState) -> Result<()> {
        self.template_project(state)?;
        if !self.subprojects_dir.exists() {
            return Ok(());
        }
        if !self.subprojects_dir.is_dir() {
            return Err(Error::RegistryInit {
                message: format!("{} is not a directory.", self.subprojects_dir.display()),
            });
        }
        for entry in std::fs::read_dir(&self.subprojects_dir)? {
            let sub_dir = entry?.path();
            if !sub_dir.is_dir() || !self.mapper.directory_supported(&sub_dir) {
                debug!("Ignoring directory {}.", sub_dir.display());
                continue;
            }
            if let Err(e) = self.load_existing_sub_project(state, &sub_dir) {
                error!(
                    "Could not load project from directory {}: {}. This will make it \
                     impossible to build its branch.",
                    sub_dir.display(),
                    e
                );
            }
        }
        Ok(())
    }

    fn load_existing_sub_project(
        &self,
        state: &mut RegistryState,
        sub_dir: &Path,
    ) -> Result<()> {
        let branch = self.mapper.from_directory(sub_dir)?;
        if state.projects.contains_key(&branch) {
            return Err(Error::ProjectAlreadyExists {
                branch: branch.head().to_string(),
            });
        }
        if !sub_dir.join(PROJECT_FILE_NAME).exists() {
            // A directory without a project file is corrupt; remove it.
            warn!(
                "Found broken project directory {}. Deleting it.",
                sub_dir.display()
            );
            std::fs::remove_dir_all(sub_dir)?;
            if sub_dir.exists() {
                return Err(Error::DeleteIncomplete {
                    path: sub_dir.to_path_buf(),
                });
            }
            return Ok(());
        }
        let delegate = self.delegates.load(branch.project_name(), sub_dir)?;
        let project = SubProject {
            name: branch.project_name().to_string(),
            root_dir: sub_dir.to_path_buf(),
            delegate,
            last_change: state.ages.get(&branch).copied(),
            broken: false,
            branch: Some(branch.clone()),
        };
        state.projects.insert(branch, project.clone());
        info!(
            "Loaded existing project {} from directory {}.",
            project,
            sub_dir.display()
        );
        Ok(())
    }

    fn template_project(&self, state: &mut RegistryState) -> Result<SubProject> {
        if let Some(template) = &state.template {
            return Ok(template.clone());
        }
        let delegate = if self.template_dir.join(PROJECT_FILE_NAME).exists() {
            self.delegates.load(&self.template_name, &self.template_dir)?
        } else {
            self.delegates.create(&self.template_name, &self.template_dir)?
        };
        // The template never builds and never binds a real branch.
        delegate.set_scm(None)?;
        delegate.set_enabled(false)?;
        let template = SubProject {
            branch: None,
            name: self.template_name.clone(),
            root_dir: self.template_dir.clone(),
            delegate,
            last_change: None,
            broken: false,
        };
        state.template = Some(template.clone());
        info!("Template project {} ready.", template);
        Ok(template)
    }
}

impl BranchAgeListener for SubProjectRegistry {
    fn register_last_change(&self, branch: &BranchId, last_change: SystemTime) {
        // The preselector side channel must not fail discovery over a
        // bookkeeping problem.
        if let Err(e) = self.register_last_change_checked(branch, last_change) {
            warn!("Could not register last change of {}: {}", branch, e);
        }
    }
}

fn delete_fully(project: &SubProject) -> Result<()> {
    project.delegate().delete()?;
    if project.root_directory().exists() {
        return Err(Error::DeleteIncomplete {
            path: project.root_directory().to_path_buf(),
        });
    }
    Ok(())
}
