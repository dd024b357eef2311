//! # Sync Command Implementation
//!
//! This module implements the `sync` subcommand: one full reconciliation
//! pass for the project in `--project-root`. Branches are discovered from
//! the configured repository, the working set is bounded by the
//! configured limits, and sub-projects are created, deleted and
//! resynchronized accordingly.
//!
//! Progress goes to the durable per-project log (`sync.log` by default)
//! and, unless `--quiet` is given, to the terminal. Per-branch failures
//! are isolated: they are reported and counted but do not abort the run,
//! so the exit status is only non-zero for run-fatal conditions (fetch
//! failure, lock timeout, interruption).
//!
//! A run that finds another reconciliation already in flight skips with a
//! notice instead of queueing; scheduling periodic runs is the operator's
//! concern (cron invoking this command).

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use console::style;

use multibranch::defaults;
use multibranch::progress::{ConsoleSink, FileSink, ProgressSink, TeeSink};
use multibranch::registry::PathClaims;
use multibranch::wiring::Wiring;

/// Run one reconciliation pass
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Root directory of the multi-branch project.
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub project_root: PathBuf,

    /// The root directory for the git mirror cache.
    ///
    /// Defaults to the system cache directory (`~/.cache/multibranch` on
    /// Linux, `~/Library/Caches/multibranch` on macOS).
    /// Can also be set with the `MULTIBRANCH_CACHE` environment variable.
    #[arg(long, value_name = "DIR", env = "MULTIBRANCH_CACHE")]
    pub cache_root: Option<PathBuf>,

    /// Only write progress to the log file, not the terminal.
    #[arg(long)]
    pub quiet: bool,
}

/// Execute the `sync` command.
pub fn execute(args: SyncArgs) -> Result<()> {
    let cache_root = args.cache_root.unwrap_or_else(defaults::default_cache_root);
    let claims = PathClaims::new();
    let wiring = Wiring::load(&args.project_root, &cache_root, &claims)
        .with_context(|| format!("Could not load project at {}", args.project_root.display()))?;

    let file_sink = FileSink::open(&wiring.log_path()).with_context(|| {
        format!(
            "Could not open synchronization log {}",
            wiring.log_path().display()
        )
    })?;
    let sink: Box<dyn ProgressSink> = if args.quiet {
        Box::new(file_sink)
    } else {
        Box::new(TeeSink(
            file_sink,
            ConsoleSink::new(console::colors_enabled()),
        ))
    };

    let report = wiring.synchronizer().synchronize_branches(sink.as_ref())?;

    if report.skipped {
        println!(
            "{} Another synchronization is still active; this run was skipped.",
            style("!").yellow()
        );
        return Ok(());
    }

    let summary = format!(
        "{} selected, {} created, {} deleted, {} synced, {} builds triggered",
        report.selected, report.created, report.deleted, report.synced, report.triggered
    );
    if report.failed > 0 {
        println!(
            "{} {} ({} failed, see {})",
            style("!").yellow(),
            summary,
            style(report.failed).red(),
            wiring.log_path().display()
        );
    } else {
        println!("{} {}", style("✓").green(), summary);
    }
    Ok(())
}
