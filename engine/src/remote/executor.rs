//! Remote command executor
//!
//! Runs commands locally or on the single configured target host. Remote
//! commands are wrapped in an `ssh` invocation for the fixed host identity;
//! file transfer goes through `scp` and `rsync` with the same identity.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::errors::ExecutionError;
use crate::remote::runner::{shell_quote, CommandRunner, Invocation};

/// SSH identity of the target host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetHost {
    pub user: String,
    pub host: String,
    pub port: Option<u16>,
    pub identity_file: Option<PathBuf>,
    /// Extra `-o` options passed to ssh, scp and rsync
    pub ssh_options: Vec<String>,
}

impl TargetHost {
    pub fn new(user: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            host: host.into(),
            port: None,
            identity_file: None,
            ssh_options: Vec::new(),
        }
    }

    /// `user@host`, or just `host` when no user is configured
    pub fn destination(&self) -> String {
        if self.user.is_empty() {
            self.host.clone()
        } else {
            format!("{}@{}", self.user, self.host)
        }
    }

    /// `user@host:path` for scp and rsync
    pub fn remote_path(&self, path: &str) -> String {
        format!("{}:{}", self.destination(), path)
    }

    fn common_args(&self, port_flag: &str) -> Vec<String> {
        let mut args = Vec::new();
        for option in &self.ssh_options {
            args.push("-o".to_string());
            args.push(option.clone());
        }
        if let Some(port) = self.port {
            args.push(port_flag.to_string());
            args.push(port.to_string());
        }
        if let Some(identity) = &self.identity_file {
            args.push("-i".to_string());
            args.push(identity.display().to_string());
        }
        args
    }

    fn ssh_args(&self) -> Vec<String> {
        self.common_args("-p")
    }

    fn scp_args(&self) -> Vec<String> {
        self.common_args("-P")
    }

    /// Remote shell command line handed to `rsync -e`
    fn rsync_shell(&self) -> String {
        Invocation::new("ssh").args(self.ssh_args()).display()
    }
}

/// Where a command runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Target {
    #[default]
    Local,
    Remote,
}

/// Per-call options for [`CommandExecutor::run`]
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub working_dir: Option<PathBuf>,
    pub target: Target,
    pub timeout: Option<Duration>,
}

impl RunOptions {
    pub fn local() -> Self {
        Self::default()
    }

    pub fn remote() -> Self {
        Self {
            target: Target::Remote,
            ..Default::default()
        }
    }

    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Executes shell commands and file transfers for the deployment pipeline.
///
/// No retries are performed here; each call is bounded by its timeout.
pub struct CommandExecutor {
    runner: Arc<dyn CommandRunner>,
    host: TargetHost,
    default_timeout: Duration,
}

impl CommandExecutor {
    pub fn new(runner: Arc<dyn CommandRunner>, host: TargetHost, default_timeout: Duration) -> Self {
        Self {
            runner,
            host,
            default_timeout,
        }
    }

    pub fn host(&self) -> &TargetHost {
        &self.host
    }

    /// Run a shell command and return its standard output
    pub async fn run(&self, command: &str, options: RunOptions) -> Result<String, ExecutionError> {
        let timeout = options.timeout.unwrap_or(self.default_timeout);
        let invocation = match options.target {
            Target::Local => {
                let invocation = Invocation::new("sh").args(["-c", command]);
                match options.working_dir {
                    Some(dir) => invocation.current_dir(dir),
                    None => invocation,
                }
            }
            Target::Remote => {
                let remote_command = match &options.working_dir {
                    Some(dir) => format!("cd {} && {}", shell_quote(&dir.display().to_string()), command),
                    None => command.to_string(),
                };
                Invocation::new("ssh")
                    .args(self.host.ssh_args())
                    .arg(self.host.destination())
                    .arg(remote_command)
            }
        };
        self.invoke(invocation.timeout(timeout)).await
    }

    /// Run a structured invocation as-is
    pub async fn invoke(&self, invocation: Invocation) -> Result<String, ExecutionError> {
        debug!("Executing on {:?}: {}", self.host.host, invocation.display());
        self.runner.run(&invocation).await
    }

    /// Copy a local file to a path on the target host
    pub async fn copy_to_remote(
        &self,
        local: &Path,
        remote_path: &str,
        timeout: Option<Duration>,
    ) -> Result<String, ExecutionError> {
        let invocation = Invocation::new("scp")
            .args(self.host.scp_args())
            .arg(local.display().to_string())
            .arg(self.host.remote_path(remote_path))
            .timeout(timeout.unwrap_or(self.default_timeout));
        self.invoke(invocation).await
    }

    /// Mirror a local directory onto a remote directory, deleting remote
    /// files that no longer exist locally
    pub async fn mirror_to_remote(
        &self,
        local_dir: &Path,
        remote_dir: &str,
        timeout: Option<Duration>,
    ) -> Result<String, ExecutionError> {
        let source = format!("{}/", local_dir.display().to_string().trim_end_matches('/'));
        let destination = format!("{}/", remote_dir.trim_end_matches('/'));
        let invocation = Invocation::new("rsync")
            .args(["-az", "--delete", "-e"])
            .arg(self.host.rsync_shell())
            .arg(source)
            .arg(self.host.remote_path(&destination))
            .timeout(timeout.unwrap_or(self.default_timeout));
        self.invoke(invocation).await
    }
}
