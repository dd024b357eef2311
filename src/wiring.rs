//! # Composition Root
//!
//! Assembles one multi-branch project's components (name mapper,
//! registry, age filter, preselector, git source and reconciliation
//! engine) from a `ProjectConfig` and the process-wide `PathClaims`.
//!
//! The claims registry is passed in explicitly rather than living in a
//! hidden static: whoever owns the process decides the scope within which
//! "one registry per on-disk root" is enforced, and tests get isolated
//! claim scopes for free.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::age_filter::AgeFilter;
use crate::branch::BranchNameMapper;
use crate::config::{self, ProjectConfig};
use crate::defaults::CONFIG_FILE_NAME;
use crate::engine::{AgeBranchesFilter, BranchesSynchronizer};
use crate::error::Result;
use crate::host::{FsDelegateFactory, FsHost};
use crate::preselector::ListeningBranchPreselector;
use crate::registry::{BranchAgeListener, PathClaims, SubProjectRegistry};
use crate::scm::GitScmSource;

/// One fully wired multi-branch project.
pub struct Wiring {
    config: ProjectConfig,
    root: PathBuf,
    registry: Arc<SubProjectRegistry>,
    engine: Arc<BranchesSynchronizer>,
}

impl Wiring {
    /// Wires a project from its parsed configuration.
    ///
    /// `root` is the project root directory, `cache_root` hosts the git
    /// mirrors.
    pub fn new(
        config: ProjectConfig,
        root: &Path,
        cache_root: &Path,
        claims: &PathClaims,
    ) -> Result<Self> {
        let subprojects_dir = config.subprojects_dir(root);
        let mapper = Arc::new(BranchNameMapper::new(
            &subprojects_dir,
            &config.branches.prefix,
            &config.branches.project_prefix,
            &config.template_name,
        )?);

        let registry = Arc::new(SubProjectRegistry::new(
            &config.name,
            root,
            subprojects_dir,
            config.template_dir(root),
            &config.template_name,
            Arc::clone(&mapper),
            Box::new(FsDelegateFactory),
            config.lock_timeout,
            claims,
        )?);

        let preselector = ListeningBranchPreselector::new(
            Arc::clone(&mapper),
            config.limits.max_age,
            &config.branches.exclude,
            Arc::clone(&registry) as Arc<dyn BranchAgeListener>,
        )?;
        let scm = Arc::new(
            GitScmSource::new(config.scm.url.clone(), cache_root)
                .with_preselector(Box::new(preselector)),
        );

        let branch_filter = AgeBranchesFilter::new(
            Arc::clone(&registry),
            AgeFilter::new(
                config.limits.normal_count,
                config.limits.max_count,
                config.limits.min_age,
            ),
        );

        let engine = Arc::new(BranchesSynchronizer::new(
            &config.name,
            Arc::clone(&registry),
            mapper,
            Box::new(branch_filter),
            scm,
            Box::new(FsHost),
        ));

        Ok(Self {
            config,
            root: root.to_path_buf(),
            registry,
            engine,
        })
    }

    /// Wires a project by reading `.multibranch.yaml` from `root`.
    pub fn load(root: &Path, cache_root: &Path, claims: &PathClaims) -> Result<Self> {
        let config = config::from_file(root.join(CONFIG_FILE_NAME))?;
        Self::new(config, root, cache_root, claims)
    }

    /// The project's configuration.
    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    /// The sub-project registry.
    pub fn registry(&self) -> &Arc<SubProjectRegistry> {
        &self.registry
    }

    /// The reconciliation engine.
    pub fn synchronizer(&self) -> &Arc<BranchesSynchronizer> {
        &self.engine
    }

    /// Absolute path of the durable per-run log.
    pub fn log_path(&self) -> PathBuf {
        self.config.log_path(&self.root)
    }
}
