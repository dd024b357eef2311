//! CLI argument parsing and command dispatch

use anyhow::Result;
use clap::{Parser, Subcommand};
use env_logger::Env;

use crate::commands;

/// Multibranch - maintain per-branch sub-projects from a template
#[derive(Parser, Debug)]
#[command(name = "multibranch")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Colorize output (always, never, auto)
    #[arg(long, global = true, value_name = "WHEN", default_value = "auto")]
    color: String,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL", default_value = "warn")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scaffold a .multibranch.yaml and template for a new project
    Init(commands::init::InitArgs),

    /// Validate a .multibranch.yaml configuration
    Validate(commands::validate::ValidateArgs),

    /// Run one reconciliation pass against the configured repository
    Sync(commands::sync::SyncArgs),

    /// Show the registered sub-projects of a project
    Status(commands::status::StatusArgs),

    /// Generate shell completion scripts
    Completions(commands::completions::CompletionsArgs),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        env_logger::Builder::from_env(Env::default().default_filter_or(&self.log_level))
            .try_init()
            .ok();
        match self.color.as_str() {
            "always" => console::set_colors_enabled(true),
            "never" => console::set_colors_enabled(false),
            _ => {}
        }

        match self.command {
            Commands::Init(args) => commands::init::execute(args),
            Commands::Validate(args) => commands::validate::execute(args),
            Commands::Sync(args) => commands::sync::execute(args),
            Commands::Status(args) => commands::status::execute(args),
            Commands::Completions(args) => commands::completions::execute(args),
        }
    }
}
