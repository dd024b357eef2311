//! # Reconciliation Engine
//!
//! The orchestrator of one multi-branch project: discover the current
//! branches, bound the working set, diff it against the registry, then
//! create missing sub-projects, delete stale ones, resynchronize the
//! survivors from the template, and trigger builds for the newcomers.
//!
//! ## Concurrency
//!
//! Reconciliation runs are serialized by an atomic in-flight flag. A run
//! requested while another is active is *dropped* with a logged skip
//! notice, not queued and not blocked. This is deliberate backpressure: the
//! next scheduled run re-discovers the same reality, so bounded resource
//! usage wins over eventual-consistency timing. The flag is released by a
//! drop guard on every exit path, so a failed or cancelled run never
//! blocks future ones.
//!
//! ## Failure isolation
//!
//! Per-item operations are applied sequentially over the diffed sets with
//! isolated failure handling: an error for one branch is reported to the
//! progress sink and the batch continues. Only interruption and lock
//! acquisition timeouts abort a batch (`Error::is_batch_fatal`); an SCM
//! fetch failure aborts the run before any mutation happens.
//!
//! Ordering is deliberate: creation before deletion before resync before
//! build-triggering, so a freshly created project exists before its first
//! config sync, stale entries never receive wasted work, and a freshly
//! synced project exists before its first build trigger.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use indicatif::HumanDuration;
use log::{debug, error, info, warn};

use crate::age_filter::AgeFilter;
use crate::branch::{BranchId, BranchNameMapper};
use crate::error::{Error, Result};
use crate::host::HostPort;
use crate::progress::{FileSink, ProgressSink};
use crate::registry::SubProjectRegistry;
use crate::scm::ScmSource;
use crate::synchronizer::ProjectSynchronizer;

/// Selects the working set out of all discovered branches.
pub trait BranchFilter: Send + Sync {
    fn select(&self, all: &BTreeSet<BranchId>) -> BTreeSet<BranchId>;
}

/// `BranchFilter` backed by the pure `AgeFilter`, with ages taken from
/// the registry's side-map.
pub struct AgeBranchesFilter {
    registry: Arc<SubProjectRegistry>,
    filter: AgeFilter,
}

impl AgeBranchesFilter {
    pub fn new(registry: Arc<SubProjectRegistry>, filter: AgeFilter) -> Self {
        Self { registry, filter }
    }
}

impl BranchFilter for AgeBranchesFilter {
    fn select(&self, all: &BTreeSet<BranchId>) -> BTreeSet<BranchId> {
        // One clock reading for the whole selection.
        let now = SystemTime::now();
        self.filter.apply(all, |branch| {
            let last_change = self.registry.get_last_change(branch).ok().flatten()?;
            Some(now.duration_since(last_change).unwrap_or(Duration::ZERO))
        })
    }
}

/// Cooperative cancellation for reconciliation runs.
///
/// Checked between per-item operations; a cancelled run aborts with
/// `Error::Interrupted` and releases the in-flight guard.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation of the current and future runs.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Interrupted);
        }
        Ok(())
    }
}

/// What one reconciliation run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Run was skipped because another one was in flight.
    pub skipped: bool,
    /// Branches in the bounded working set.
    pub selected: usize,
    /// Sub-projects created.
    pub created: usize,
    /// Sub-projects deleted.
    pub deleted: usize,
    /// Sub-projects resynchronized from the template.
    pub synced: usize,
    /// Builds triggered for new branches.
    pub triggered: usize,
    /// Per-item failures that were isolated and logged.
    pub failed: usize,
}

impl SyncReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

/// Orchestrates reconciliation runs for one multi-branch project.
pub struct BranchesSynchronizer {
    parent_name: String,
    registry: Arc<SubProjectRegistry>,
    mapper: Arc<BranchNameMapper>,
    branch_filter: Box<dyn BranchFilter>,
    scm: Arc<dyn ScmSource>,
    synchronizer: ProjectSynchronizer,
    host: Box<dyn HostPort>,
    sync_in_progress: AtomicBool,
    cancel: CancelFlag,
}

impl BranchesSynchronizer {
    pub fn new(
        parent_name: &str,
        registry: Arc<SubProjectRegistry>,
        mapper: Arc<BranchNameMapper>,
        branch_filter: Box<dyn BranchFilter>,
        scm: Arc<dyn ScmSource>,
        host: Box<dyn HostPort>,
    ) -> Self {
        Self {
            parent_name: parent_name.to_string(),
            registry,
            mapper,
            branch_filter,
            scm,
            synchronizer: ProjectSynchronizer::new(parent_name),
            host,
            sync_in_progress: AtomicBool::new(false),
            cancel: CancelFlag::new(),
        }
    }

    /// The flag cancelling this engine's runs.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Schedules a reconciliation run on the shared worker pool, logging
    /// to the durable per-project log at `log_path`.
    ///
    /// Failures of the background run are logged; the periodic trigger
    /// retries on its next tick.
    pub fn spawn(self: &Arc<Self>, log_path: PathBuf) {
        debug!("Scheduling branch synchronization for {}.", self.parent_name);
        let engine = Arc::clone(self);
        rayon::spawn(move || match FileSink::open(&log_path) {
            Ok(sink) => {
                if let Err(e) = engine.synchronize_branches(&sink) {
                    error!("Branch synchronization failed: {}", e);
                }
            }
            Err(e) => error!(
                "Could not open synchronization log {}: {}",
                log_path.display(),
                e
            ),
        });
    }

    /// Runs one reconciliation pass.
    ///
    /// Returns a skipped report if another pass is already in flight.
    /// Batch-fatal errors (fetch failure, lock timeout, interruption)
    /// surface as `Err`; per-item failures are counted in the report.
    pub fn synchronize_branches(&self, sink: &dyn ProgressSink) -> Result<SyncReport> {
        if self
            .sync_in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("Skipped synchronization run (still active).");
            sink.message("Skipped synchronization run (still active).");
            return Ok(SyncReport::skipped());
        }
        // Release the in-flight flag on every exit path.
        let _in_flight = InFlightGuard(&self.sync_in_progress);

        let started = Instant::now();
        sink.message(&format!(
            "Started on {}.",
            humantime::format_rfc3339_seconds(SystemTime::now())
        ));
        info!("Synchronizing branches of {}.", self.parent_name);

        let result = self.do_synchronize(sink);
        if let Err(e) = &result {
            error!("Error during branch synchronization: {}", e);
            sink.error(&format!("Synchronization failed: {}", e));
        }
        sink.message(&format!("Done. Took {}.", HumanDuration(started.elapsed())));
        result
    }

    fn do_synchronize(&self, sink: &dyn ProgressSink) -> Result<SyncReport> {
        let _scope = self.host.enter_system_scope();

        // Get all SCM branches when this run starts (snapshot):
        sink.message("---");
        sink.message(&format!("Reading branches from {}.", self.scm.describe()));
        let heads = self.scm.fetch(sink)?;
        sink.message("Finished reading branches.");
        sink.message("---");

        let mut discovered: BTreeSet<BranchId> = BTreeSet::new();
        for head in &heads {
            match self.mapper.from_branch_head(head.name()) {
                Ok(branch) => {
                    discovered.insert(branch);
                }
                // Normally filtered out by the preselector already.
                Err(e) => debug!("Ignoring discovered branch: {}", e),
            }
        }
        let all_branches = self.branch_filter.select(&discovered);
        sink.message(&format!(
            "{} branches selected from {}.",
            all_branches.len(),
            discovered.len()
        ));

        // Get all current branches (snapshot):
        let existing_branches = self.registry.get_branches()?;

        let new_branches: BTreeSet<BranchId> = all_branches
            .difference(&existing_branches)
            .cloned()
            .collect();
        let stale_branches: BTreeSet<BranchId> = existing_branches
            .difference(&all_branches)
            .cloned()
            .collect();

        let mut report = SyncReport {
            selected: all_branches.len(),
            ..SyncReport::default()
        };

        report.created = self.for_each(
            &new_branches,
            format!("Creating {} new sub-projects:", new_branches.len()),
            sink,
            &mut report.failed,
            |branch| self.registry.create_new_sub_project(branch).map(|_| ()),
        )?;

        report.deleted = self.for_each(
            &stale_branches,
            format!("Deleting {} old sub-projects:", stale_branches.len()),
            sink,
            &mut report.failed,
            |branch| self.registry.delete(branch),
        )?;

        let template = self.registry.get_template_project()?;
        report.synced = self.for_each(
            &all_branches,
            format!("Synchronizing {} sub-projects:", all_branches.len()),
            sink,
            &mut report.failed,
            |branch| {
                let sub_project = self.registry.get_project(branch)?;
                self.synchronizer.synchronize(
                    &template,
                    &sub_project,
                    self.scm.as_ref(),
                    new_branches.contains(branch),
                    sink,
                )
            },
        )?;

        sink.message("Updating host state.");
        self.host.update();

        report.triggered = self.for_each(
            &new_branches,
            format!("Triggering build for {} sub-projects:", new_branches.len()),
            sink,
            &mut report.failed,
            |branch| {
                let project = self.registry.get_project(branch)?;
                project.delegate().schedule_build("New branch detected.")
            },
        )?;

        Ok(report)
    }

    /// Applies `action` to every branch, isolating per-item failures.
    ///
    /// Returns the number of successful items. Batch-fatal errors
    /// propagate immediately; everything else is reported through the
    /// sink and counted in `failed`.
    fn for_each<F>(
        &self,
        branches: &BTreeSet<BranchId>,
        message: String,
        sink: &dyn ProgressSink,
        failed: &mut usize,
        mut action: F,
    ) -> Result<usize>
    where
        F: FnMut(&BranchId) -> Result<()>,
    {
        sink.message(&message);
        let mut succeeded = 0;
        for branch in branches {
            if let Err(e) = self.cancel.check() {
                sink.error(&format!("Interrupted before processing {}.", branch));
                return Err(e);
            }
            match action(branch) {
                Ok(()) => {
                    succeeded += 1;
                    sink.message(&format!("{}: DONE.", branch));
                }
                Err(e) if e.is_batch_fatal() => {
                    sink.error(&format!("{}: aborting batch: {}", branch, e));
                    return Err(e);
                }
                Err(e) => {
                    *failed += 1;
                    error!("Failed to process {}: {}", branch, e);
                    sink.error(&format!("{}: FAILED. {}", branch, e));
                }
            }
        }
        Ok(succeeded)
    }
}

/// Clears the in-flight flag when dropped, whatever the exit path was.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
