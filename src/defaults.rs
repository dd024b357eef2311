//! Default values for multibranch configuration.
//!
//! This module provides centralized default values used across commands,
//! ensuring consistency and avoiding duplication.

use std::path::PathBuf;
use std::time::Duration;

/// Name of the configuration file at a multi-branch project root.
pub const CONFIG_FILE_NAME: &str = ".multibranch.yaml";

/// Name of the persisted configuration file inside every sub-project
/// directory. A sub-project directory without this file is corrupt.
pub const PROJECT_FILE_NAME: &str = "project.yaml";

/// How long a registry operation may wait for the project lock before
/// failing loudly.
pub const LOCK_TIMEOUT: Duration = Duration::from_secs(60);

/// Returns the default cache root for git mirrors.
///
/// Uses the platform-appropriate cache directory:
/// - Linux: `~/.cache/multibranch` (XDG Base Directory)
/// - macOS: `~/Library/Caches/multibranch`
/// - Windows: `{FOLDERID_LocalAppData}\multibranch`
///
/// Falls back to `.multibranch-cache` in the current directory if the
/// platform cache directory cannot be determined.
///
/// This can be overridden by the `--cache-root` CLI flag or the
/// `MULTIBRANCH_CACHE` environment variable.
pub fn default_cache_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".multibranch-cache"))
        .join("multibranch")
}
