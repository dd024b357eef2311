//! # Project Synchronizer
//!
//! Reconciles one existing sub-project's configuration against the
//! template. Per-branch customization is not supported: every
//! reconciliation overwrites the sub-project's persisted configuration
//! with the template's, by design. The branch-specific SCM binding is
//! re-applied after the overwrite, because the template itself never
//! carries a binding.

use crate::error::{Error, Result};
use crate::progress::ProgressSink;
use crate::registry::SubProject;
use crate::scm::ScmSource;

/// Pushes the template configuration onto one sub-project.
pub struct ProjectSynchronizer {
    parent_name: String,
}

impl ProjectSynchronizer {
    /// `parent_name` is the multi-branch project the sub-projects are
    /// re-registered under after a sync.
    pub fn new(parent_name: &str) -> Self {
        Self {
            parent_name: parent_name.to_string(),
        }
    }

    /// Synchronizes `sub_project` from `template`.
    ///
    /// `newly_created` marks a sub-project this run created or revived;
    /// only those are enabled here. Existing projects keep their
    /// enabled-state; disabling is the parent project's call, never this
    /// one's.
    pub fn synchronize(
        &self,
        template: &SubProject,
        sub_project: &SubProject,
        scm: &dyn ScmSource,
        newly_created: bool,
        sink: &dyn ProgressSink,
    ) -> Result<()> {
        if sub_project.is_template() {
            return Err(Error::TemplateNotSynchronizable);
        }
        sink.message(&format!(
            "Syncing configuration to project {}.",
            sub_project.name()
        ));

        let template_spec = template.delegate().config()?;
        let delegate = sub_project.delegate();
        delegate.overwrite_config(&template_spec)?;

        // The overwrite cleared the SCM binding (the template has none);
        // a sub-project must never stay without a real one.
        let branch = sub_project
            .branch()
            .expect("non-template sub-project has a branch");
        let binding = scm
            .build(branch.head())
            .ok_or_else(|| Error::NoScmForBranch {
                branch: branch.head().to_string(),
            })?;
        delegate.set_scm(Some(binding))?;

        if newly_created {
            delegate.set_enabled(true)?;
        }

        // Workspace resolution needs the path pre-set on the sub-project;
        // copying it from the template works around that host defect.
        delegate.set_custom_workspace(template_spec.custom_workspace.clone())?;

        delegate.reload(&self.parent_name)?;
        Ok(())
    }
}
