//! Per-attempt workspace directories
//!
//! Every attempt gets `<base>/<attempt id>`. A [`Workspace`] is a scoped
//! guard: the pipeline releases it explicitly in its cleaning stage, and a
//! guard dropped without release (panic, cancelled task) removes its directory
//! synchronously so no workspace outlives its attempt.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::errors::WorkspaceError;
use crate::filesys::dir::Dir;

/// Allocates isolated working directories under a base directory
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    base: Dir,
}

impl WorkspaceManager {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base: Dir::new(base_dir),
        }
    }

    pub fn base_dir(&self) -> &Path {
        self.base.path()
    }

    /// Workspace path for an attempt id
    pub fn path_for(&self, id: &Uuid) -> PathBuf {
        self.base.path().join(id.to_string())
    }

    /// Whether the workspace of an attempt currently exists
    pub async fn exists(&self, id: &Uuid) -> bool {
        Dir::new(self.path_for(id)).exists().await
    }

    /// Create a fresh workspace for an attempt
    pub async fn allocate(&self, id: Uuid) -> Result<Workspace, WorkspaceError> {
        self.base
            .create()
            .await
            .map_err(|source| WorkspaceError::Create {
                path: self.base.path().to_path_buf(),
                source,
            })?;

        let path = self.path_for(&id);
        fs::create_dir(&path)
            .await
            .map_err(|source| WorkspaceError::Create {
                path: path.clone(),
                source,
            })?;

        debug!("[{}] Allocated workspace {}", id, path.display());
        Ok(Workspace {
            id,
            path,
            released: false,
        })
    }

    /// Remove workspaces left behind by a previous process.
    ///
    /// Only directories named by an attempt id are touched. Must run before any
    /// attempt is accepted.
    pub async fn sweep_stale(&self) -> usize {
        if !self.base.exists().await {
            return 0;
        }

        let dirs = match self.base.list_dirs().await {
            Ok(dirs) => dirs,
            Err(e) => {
                warn!("Unable to list workspaces in {}: {}", self.base.path().display(), e);
                return 0;
            }
        };

        let mut removed = 0;
        for dir in dirs {
            let is_attempt = dir
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| Uuid::parse_str(name).is_ok());
            if !is_attempt {
                continue;
            }
            match Dir::new(&dir).delete().await {
                Ok(()) => removed += 1,
                Err(e) => warn!("Unable to remove stale workspace {}: {}", dir.display(), e),
            }
        }

        if removed > 0 {
            info!("Removed {} stale workspace(s)", removed);
        }
        removed
    }
}

/// An allocated workspace directory
#[derive(Debug)]
pub struct Workspace {
    id: Uuid,
    path: PathBuf,
    released: bool,
}

impl Workspace {
    pub fn id(&self) -> &Uuid {
        &self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of a subdirectory inside the workspace
    pub fn join(&self, relative: &str) -> PathBuf {
        self.path.join(relative)
    }

    /// Remove the workspace; failures are logged, never propagated
    pub async fn release(mut self) {
        if let Err(e) = Dir::new(&self.path).delete().await {
            let err = WorkspaceError::Remove {
                path: self.path.clone(),
                source: e,
            };
            error!("[{}] {}", self.id, err);
        } else {
            debug!("[{}] Released workspace {}", self.id, self.path.display());
        }
        self.released = true;
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        warn!(
            "[{}] Workspace dropped without release, removing {}",
            self.id,
            self.path.display()
        );
        match std::fs::remove_dir_all(&self.path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                error!("[{}] Unable to remove workspace: {}", self.id, e);
            }
            _ => {}
        }
    }
}
