//! Repository retrieval

use std::path::Path;
use std::time::Duration;

use tracing::info;

use crate::errors::ExecutionError;
use crate::remote::executor::CommandExecutor;
use crate::remote::runner::Invocation;

/// Build the clone invocation for a single branch of a repository
pub fn clone_invocation(repo_url: &str, branch: &str, target_dir: &Path) -> Invocation {
    Invocation::new("git")
        .args(["clone", "--branch", branch, "--single-branch", "--"])
        .arg(repo_url)
        .arg(target_dir.display().to_string())
}

/// Clone `branch` of `repo_url` into `target_dir`, which must be empty
pub async fn fetch_repository(
    executor: &CommandExecutor,
    repo_url: &str,
    branch: &str,
    target_dir: &Path,
    timeout: Duration,
) -> Result<(), ExecutionError> {
    info!(
        "Cloning {} (branch: {}) into {}",
        repo_url,
        branch,
        target_dir.display()
    );
    executor
        .invoke(clone_invocation(repo_url, branch, target_dir).timeout(timeout))
        .await?;
    Ok(())
}
