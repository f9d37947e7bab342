use anyhow::{Result, anyhow};
use std::path::{Path, PathBuf};
use tokio::process::Command;

use crate::error::Error;
use crate::services::VersionControl;

#[derive(Debug, Clone)]
pub struct GitInfo {
    pub commit_short: String,
}

pub async fn get_git_info(root: &Path) -> Result<GitInfo> {
    let commit_short = get_commit_short(root).await?;
    Ok(GitInfo { commit_short })
}

async fn get_commit_short(root: &Path) -> Result<String> {
    let output = Command::new("git")
        .arg("rev-parse")
        .arg("--short")
        .arg("HEAD")
        .current_dir(root)
        .output()
        .await?;

    if !output.status.success() {
        return Err(anyhow!("git rev-parse failed"));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Stages and commits through the `git` binary. Blocking; the batch runner
/// calls it from a worker thread.
#[derive(Debug, Clone)]
pub struct GitVcs {
    root: PathBuf,
}

impl GitVcs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn git<I, S>(&self, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let output = std::process::Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .output()
            .map_err(|e| Error::Vcs(format!("cannot run git: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Vcs(stderr.trim().to_string()).into());
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl VersionControl for GitVcs {
    fn add_files(&self, paths: &[PathBuf]) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }

        let relative: Vec<&Path> = paths
            .iter()
            .map(|p| p.strip_prefix(&self.root).unwrap_or(p))
            .collect();

        let mut args: Vec<&std::ffi::OsStr> = vec!["add".as_ref(), "--".as_ref()];
        args.extend(relative.iter().map(|p| p.as_os_str()));
        self.git(args)?;
        Ok(())
    }

    fn commit(&self, message: &str) -> Result<String> {
        self.git(["commit", "-m", message])?;
        self.git(["rev-parse", "--short", "HEAD"])
    }
}
