use std::fs;
use std::io::{self, Write};
use std::path::Path;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tempfile::Builder;

use crate::error::AssemblerError;

const STAGING_PREFIX: &str = ".sra-assembler-publish-";

/// Final artifacts placed in the user's output directory.
#[derive(Debug, Clone, Serialize)]
pub struct Published {
    pub assembly_dir: String,
    pub contigs: String,
}

/// Places a finished assembly under `outdir`.
///
/// The assembly directory and the contigs file are both copied into one
/// staging directory inside `outdir` first and only renamed into place once
/// every copy has succeeded, so a failed copy leaves the previous output
/// untouched.
pub struct Publisher {
    outdir: Utf8PathBuf,
}

impl Publisher {
    pub fn new(outdir: &Utf8Path) -> Self {
        Self {
            outdir: outdir.to_path_buf(),
        }
    }

    pub fn assembly_dir(&self) -> Utf8PathBuf {
        self.outdir.join("assembly")
    }

    pub fn contigs_path(&self) -> Utf8PathBuf {
        self.outdir.join("contigs.fa")
    }

    pub fn summary_path(&self) -> Utf8PathBuf {
        self.outdir.join("run.json")
    }

    pub fn publish(
        &self,
        assembly_dir: &Utf8Path,
        contigs: &Utf8Path,
    ) -> Result<Published, AssemblerError> {
        if !contigs.as_std_path().is_file() {
            return Err(AssemblerError::Filesystem(format!("missing contigs at {contigs}")));
        }
        fs::create_dir_all(self.outdir.as_std_path())
            .map_err(fs_error(format!("create {}", self.outdir)))?;
        let staging = Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(self.outdir.as_std_path())
            .map_err(fs_error(format!("stage in {}", self.outdir)))?;

        let staged_assembly = staging.path().join("assembly");
        let staged_contigs = staging.path().join("contigs.fa");
        copy_tree(assembly_dir.as_std_path(), &staged_assembly)
            .map_err(fs_error(format!("copy {assembly_dir}")))?;
        fs::copy(contigs.as_std_path(), &staged_contigs)
            .map_err(fs_error(format!("copy {contigs}")))?;

        let dest_dir = self.assembly_dir();
        let dest_contigs = self.contigs_path();
        if dest_dir.as_std_path().exists() {
            fs::remove_dir_all(dest_dir.as_std_path())
                .map_err(fs_error(format!("remove previous {dest_dir}")))?;
        }
        fs::rename(&staged_assembly, dest_dir.as_std_path())
            .map_err(fs_error(format!("move into {dest_dir}")))?;
        fs::rename(&staged_contigs, dest_contigs.as_std_path())
            .map_err(fs_error(format!("move into {dest_contigs}")))?;

        tracing::info!(path = %dest_contigs, "assembly published");
        Ok(Published {
            assembly_dir: dest_dir.to_string(),
            contigs: dest_contigs.to_string(),
        })
    }

    /// Writes `run.json` through a temp file in `outdir` so readers never see
    /// a truncated summary.
    pub fn write_summary<T: Serialize>(&self, summary: &T) -> Result<Utf8PathBuf, AssemblerError> {
        let path = self.summary_path();
        fs::create_dir_all(self.outdir.as_std_path())
            .map_err(fs_error(format!("create {}", self.outdir)))?;
        let mut file = Builder::new()
            .prefix(STAGING_PREFIX)
            .tempfile_in(self.outdir.as_std_path())
            .map_err(fs_error(format!("stage in {}", self.outdir)))?;
        serde_json::to_writer_pretty(&mut file, summary)
            .map_err(|err| AssemblerError::Filesystem(format!("encode summary: {err}")))?;
        file.write_all(b"\n")
            .map_err(fs_error(format!("write {path}")))?;
        file.persist(path.as_std_path())
            .map_err(|err| AssemblerError::Filesystem(format!("write {path}: {}", err.error)))?;
        Ok(path)
    }
}

fn fs_error(context: String) -> impl FnOnce(io::Error) -> AssemblerError {
    move |err| AssemblerError::Filesystem(format!("{context}: {err}"))
}

fn copy_tree(source: &Path, dest: &Path) -> io::Result<()> {
    fs::create_dir_all(dest)?;
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let target = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
