//! # Init Command Implementation
//!
//! This module implements the `init` subcommand, which scaffolds a new
//! multi-branch project: a `.multibranch.yaml` pointing at the given
//! repository plus a template sub-project with a placeholder build step.
//!
//! The command refuses to overwrite an existing configuration unless
//! `--force` is given. It never contacts the repository; the first `sync`
//! does that.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use console::style;

use multibranch::defaults::{CONFIG_FILE_NAME, PROJECT_FILE_NAME};
use multibranch::host::ProjectSpec;

/// Scaffold a new multi-branch project
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Repository URL branches are discovered from.
    #[arg(long, value_name = "URL")]
    pub url: String,

    /// Project name. Defaults to the root directory's name.
    #[arg(long, value_name = "NAME")]
    pub name: Option<String>,

    /// Directory to initialize.
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub project_root: PathBuf,

    /// Overwrite an existing configuration.
    #[arg(long)]
    pub force: bool,
}

/// Execute the `init` command.
pub fn execute(args: InitArgs) -> Result<()> {
    let root = &args.project_root;
    std::fs::create_dir_all(root)
        .with_context(|| format!("Could not create {}", root.display()))?;

    let config_path = root.join(CONFIG_FILE_NAME);
    if config_path.exists() && !args.force {
        bail!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
    }

    let name = match args.name {
        Some(name) => name,
        None => root
            .canonicalize()
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "multibranch-project".to_string()),
    };

    let config = format!(
        r#"name: {}
scm:
  url: {}
branches:
  prefix: feature/
  project_prefix: f-
limits:
  normal_count: 20
  max_count: 50
  min_age: 24h
"#,
        name, args.url
    );
    // Reject bad input before writing anything.
    multibranch::config::parse(&config)
        .with_context(|| format!("Generated configuration for url {} is invalid", args.url))?;
    std::fs::write(&config_path, config)?;

    let template_dir = root.join("template");
    let template_file = template_dir.join(PROJECT_FILE_NAME);
    if !template_file.exists() {
        std::fs::create_dir_all(&template_dir)?;
        let mut spec = ProjectSpec::new("template");
        spec.steps = vec!["echo replace me with real build steps".to_string()];
        std::fs::write(&template_file, serde_yaml::to_string(&spec)?)?;
    }

    println!(
        "{} Initialized multi-branch project {} in {}",
        style("✓").green(),
        style(&name).bold(),
        root.display()
    );
    println!("  Edit {} to define the build, then run:", template_file.display());
    println!("  multibranch sync --project-root {}", root.display());
    Ok(())
}
