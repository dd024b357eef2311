//! # Status Command Implementation
//!
//! This module implements the `status` subcommand, which lists the
//! template and every registered sub-project of a multi-branch project:
//! bound branch, enabled-state, last known SCM change and whether the
//! entry is broken (a partially failed delete that needs an operator).
//!
//! The listing is produced from the on-disk registry state; the
//! repository is not contacted.

use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use clap::Args;
use console::style;

use multibranch::defaults;
use multibranch::registry::PathClaims;
use multibranch::wiring::Wiring;

/// List registered sub-projects
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Root directory of the multi-branch project.
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub project_root: PathBuf,

    /// The root directory for the git mirror cache.
    #[arg(long, value_name = "DIR", env = "MULTIBRANCH_CACHE")]
    pub cache_root: Option<PathBuf>,
}

/// Execute the `status` command.
pub fn execute(args: StatusArgs) -> Result<()> {
    let cache_root = args.cache_root.unwrap_or_else(defaults::default_cache_root);
    let claims = PathClaims::new();
    let wiring = Wiring::load(&args.project_root, &cache_root, &claims)
        .with_context(|| format!("Could not load project at {}", args.project_root.display()))?;

    let config = wiring.config();
    println!("{} ({})", style(&config.name).bold(), config.scm.url);

    let template = wiring.registry().get_template_project()?;
    println!("  {} {}", style("template").dim(), template.name());

    let projects = wiring.registry().get_projects()?;
    if projects.is_empty() {
        println!("  no sub-projects (run `multibranch sync` to create them)");
        return Ok(());
    }
    for project in &projects {
        let enabled = match project.delegate().config() {
            Ok(spec) if spec.enabled => style("enabled ").green(),
            Ok(_) => style("disabled").dim(),
            Err(_) => style("unreadable").red(),
        };
        let branch = project
            .branch()
            .map(|b| b.head().to_string())
            .unwrap_or_default();
        let mut line = format!("  {:<24} {} {}", project.name(), enabled, branch);
        if let Some(last_change) = project.last_scm_change() {
            let age = SystemTime::now()
                .duration_since(last_change)
                .unwrap_or(Duration::ZERO);
            line.push_str(&format!(
                " (last change {} ago)",
                humantime::format_duration(Duration::from_secs(age.as_secs()))
            ));
        }
        if project.is_broken() {
            line.push_str(&format!(" {}", style("BROKEN").red().bold()));
        }
        println!("{}", line);
    }
    Ok(())
}
