use std::fs;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::{Builder, TempDir};

use crate::domain::Accession;
use crate::error::AssemblerError;

/// Per-run scratch directory under the temp root.
///
/// Owns the directory exclusively. `release` consumes the workspace, so the
/// tree is torn down at most once; an unreleased workspace is removed when
/// dropped, which covers unwinding out of the controller.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
    root: Utf8PathBuf,
}

impl Workspace {
    pub fn acquire(temp_root: &Utf8Path, accession: &Accession) -> Result<Self, AssemblerError> {
        let dir = Builder::new()
            .prefix(&format!("sra-assembler-{}-", accession.as_str()))
            .tempdir_in(temp_root.as_std_path())
            .map_err(|err| {
                AssemblerError::Workspace(format!("cannot create workspace in {temp_root}: {err}"))
            })?;
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf())
            .map_err(|_| AssemblerError::Workspace("invalid workspace path".to_string()))?;

        let workspace = Self { dir, root };
        for sub in [
            workspace.raw_dir(),
            workspace.stats_dir(),
            workspace.trimmed_dir(),
        ] {
            fs::create_dir_all(sub.as_std_path()).map_err(|err| {
                AssemblerError::Workspace(format!("cannot create {sub}: {err}"))
            })?;
        }
        tracing::debug!(path = %workspace.root, "workspace acquired");
        Ok(workspace)
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn raw_dir(&self) -> Utf8PathBuf {
        self.root.join("raw")
    }

    pub fn stats_dir(&self) -> Utf8PathBuf {
        self.root.join("stats")
    }

    pub fn trimmed_dir(&self) -> Utf8PathBuf {
        self.root.join("trimmed")
    }

    /// Left for the assembler to create; shovill refuses an existing
    /// directory without `--force`.
    pub fn assembly_dir(&self) -> Utf8PathBuf {
        self.root.join("assembly")
    }

    pub fn assembler_tmp_dir(&self) -> Utf8PathBuf {
        self.root.join("shovill-tmp")
    }

    /// Removes the tree unless `keep` is set. Returns the retained path when
    /// kept. Removal failures are logged only: the run outcome is already
    /// decided by the time this is called.
    pub fn release(self, keep: bool) -> Option<Utf8PathBuf> {
        if keep {
            let root = self.root;
            let _ = self.dir.keep();
            tracing::info!(path = %root, "workspace kept");
            return Some(root);
        }
        let root = self.root;
        match self.dir.close() {
            Ok(()) => tracing::debug!(path = %root, "workspace removed"),
            Err(err) => tracing::warn!(path = %root, error = %err, "failed to remove workspace"),
        }
        None
    }
}

/// Path of the live workspace, shared with the interrupt handler so a killed
/// run can still remove its scratch tree.
#[derive(Debug, Clone, Default)]
pub struct CleanupSlot {
    path: Arc<Mutex<Option<Utf8PathBuf>>>,
}

impl CleanupSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, path: &Utf8Path) {
        *self.lock() = Some(path.to_path_buf());
    }

    pub fn clear(&self) {
        self.lock().take();
    }

    pub fn registered(&self) -> Option<Utf8PathBuf> {
        self.lock().clone()
    }

    /// Removes the registered tree and empties the slot. Returns the path
    /// when something was removed.
    pub fn cleanup(&self) -> Option<Utf8PathBuf> {
        let path = self.lock().take()?;
        match fs::remove_dir_all(path.as_std_path()) {
            Ok(()) => Some(path),
            Err(err) => {
                tracing::warn!(path = %path, error = %err, "failed to remove workspace");
                None
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Utf8PathBuf>> {
        self.path.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
