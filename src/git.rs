//! Git subprocess plumbing for branch discovery.
//!
//! Branch discovery works against a mirror clone kept in the cache
//! directory: the first fetch creates it with `git clone --mirror`, later
//! fetches refresh it with `git remote update --prune`, and the branch
//! list with commit dates comes from `git for-each-ref`.
//!
//! This uses the system git command, which automatically handles:
//! - SSH keys from ~/.ssh/
//! - Git credential helpers
//! - Personal access tokens
//! - Any authentication configured in ~/.gitconfig

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::{Error, Result};

/// Derive the mirror directory for a repository URL below `cache_root`.
pub fn mirror_path(cache_root: &Path, url: &str) -> PathBuf {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    // Create a hash of the URL for filesystem-safe directory name
    let mut hasher = DefaultHasher::new();
    url.hash(&mut hasher);
    let url_hash = format!("{:x}", hasher.finish());

    // Keep a recognizable tail of the URL next to the hash
    let tail: String = url
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or("repo")
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '.' || c == '-' || c == '_' { c } else { '-' })
        .collect();

    cache_root.join(format!("{}-{}.git", url_hash, tail))
}

/// Create or refresh the mirror clone of `url` at `mirror`.
pub fn update_mirror(url: &str, mirror: &Path) -> Result<()> {
    if mirror.join("HEAD").exists() {
        run_git(
            url,
            Command::new("git")
                .arg("--git-dir")
                .arg(mirror)
                .args(["remote", "update", "--prune"]),
            "remote update --prune",
        )?;
    } else {
        // Create parent directory if it doesn't exist
        if let Some(parent) = mirror.parent() {
            fs::create_dir_all(parent)?;
        }
        run_git(
            url,
            Command::new("git").args(["clone", "--mirror", url]).arg(mirror),
            "clone --mirror",
        )?;
    }
    Ok(())
}

/// List all branch heads with their last commit dates from a mirror.
pub fn list_heads(url: &str, mirror: &Path) -> Result<Vec<(String, SystemTime)>> {
    let stdout = run_git(
        url,
        Command::new("git")
            .arg("--git-dir")
            .arg(mirror)
            .args([
                "for-each-ref",
                "refs/heads",
                "--format=%(refname:strip=2)%09%(committerdate:unix)",
            ]),
        "for-each-ref refs/heads",
    )?;
    Ok(parse_heads(&stdout))
}

/// Parse `for-each-ref` output: one `<name>\t<unix-seconds>` pair per line.
fn parse_heads(stdout: &str) -> Vec<(String, SystemTime)> {
    stdout
        .lines()
        .filter_map(|line| {
            let (name, date) = line.split_once('\t')?;
            if name.is_empty() {
                return None;
            }
            let seconds: u64 = date.trim().parse().ok()?;
            Some((
                name.to_string(),
                UNIX_EPOCH + Duration::from_secs(seconds),
            ))
        })
        .collect()
}

/// Run a git command, mapping failures onto `Error::GitCommand`.
fn run_git(url: &str, command: &mut Command, description: &str) -> Result<String> {
    let output = command.output().map_err(|e| Error::GitCommand {
        command: description.to_string(),
        url: url.to_string(),
        stderr: e.to_string(),
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::GitCommand {
            command: description.to_string(),
            url: url.to_string(),
            stderr: stderr.to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mirror_path_is_below_cache_root() {
        let cache_root = PathBuf::from("/tmp/cache");
        let path = mirror_path(&cache_root, "https://github.com/example/repo.git");
        assert!(path.starts_with(&cache_root));
        assert!(path.to_string_lossy().ends_with(".git"));
        assert!(path.to_string_lossy().contains("repo.git"));
    }

    #[test]
    fn test_mirror_path_different_urls_do_not_collide() {
        let cache_root = PathBuf::from("/tmp/cache");
        let path1 = mirror_path(&cache_root, "https://github.com/user1/repo.git");
        let path2 = mirror_path(&cache_root, "https://github.com/user2/repo.git");
        assert_ne!(path1, path2);
    }

    #[test]
    fn test_mirror_path_sanitizes_odd_characters() {
        let cache_root = PathBuf::from("/tmp/cache");
        let path = mirror_path(&cache_root, "git@host.com:team/odd repo");
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(!name.contains(' '));
        assert!(name.ends_with(".git"));
    }

    #[test]
    fn test_mirror_path_trailing_slash() {
        let cache_root = PathBuf::from("/tmp/cache");
        let path = mirror_path(&cache_root, "https://github.com/example/repo/");
        assert!(path.to_string_lossy().contains("repo"));
    }

    #[test]
    fn test_parse_heads() {
        let stdout = "feature/login\t1700000000\nfeature/search\t1700000100\n";
        let heads = parse_heads(stdout);
        assert_eq!(heads.len(), 2);
        assert_eq!(heads[0].0, "feature/login");
        assert_eq!(
            heads[0].1,
            UNIX_EPOCH + Duration::from_secs(1_700_000_000)
        );
        assert_eq!(heads[1].0, "feature/search");
    }

    #[test]
    fn test_parse_heads_skips_malformed_lines() {
        let stdout = "feature/good\t1700000000\nno-tab-here\nfeature/bad-date\tnot-a-number\n\t123\n";
        let heads = parse_heads(stdout);
        assert_eq!(heads.len(), 1);
        assert_eq!(heads[0].0, "feature/good");
    }

    #[test]
    fn test_parse_heads_empty_output() {
        assert!(parse_heads("").is_empty());
    }

    // Note: integration coverage for update_mirror and list_heads against a
    // real repository lives in the CLI E2E tests, which build a local git
    // fixture.
}
