//! # Validate Command Implementation
//!
//! This module implements the `validate` subcommand, which parses a
//! `.multibranch.yaml` configuration file and reports whether it is
//! usable: schema-valid, semantically consistent (branch prefix shape,
//! limit ordering, compilable exclude patterns) and complete.
//!
//! This command is a safe, read-only operation that does not modify any
//! files and never contacts the repository.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use console::style;

use multibranch::config;
use multibranch::defaults::CONFIG_FILE_NAME;

/// Validate a project configuration
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Path to the configuration file to check.
    #[arg(short, long, value_name = "FILE", default_value = CONFIG_FILE_NAME)]
    pub config: PathBuf,
}

/// Execute the `validate` command.
pub fn execute(args: ValidateArgs) -> Result<()> {
    let config = config::from_file(&args.config)
        .with_context(|| format!("Invalid configuration {}", args.config.display()))?;

    println!(
        "{} {} is valid",
        style("✓").green(),
        args.config.display()
    );
    println!("  project:        {}", config.name);
    println!("  repository:     {}", config.scm.url);
    println!(
        "  branches:       {}* -> {}*",
        config.branches.prefix, config.branches.project_prefix
    );
    if !config.branches.exclude.is_empty() {
        println!("  excluded:       {}", config.branches.exclude.join(", "));
    }
    match (config.limits.normal_count, config.limits.max_count) {
        (None, None) => println!("  limits:         unbounded"),
        (normal, max) => println!(
            "  limits:         normal {} / max {}",
            normal.map_or("-".to_string(), |n| n.to_string()),
            max.map_or("-".to_string(), |n| n.to_string()),
        ),
    }
    if let Some(min_age) = config.limits.min_age {
        println!("  grace period:   {}", humantime::format_duration(min_age));
    }
    if let Some(max_age) = config.limits.max_age {
        println!("  max branch age: {}", humantime::format_duration(max_age));
    }
    Ok(())
}
