use std::fs;
use std::path::{Path, PathBuf};

use camino::{Utf8Path, Utf8PathBuf};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::domain::{Accession, GenomeSize, Stage};
use crate::error::AssemblerError;

pub const CONFIG_FILE_NAME: &str = "sra-assembler.json";
pub const DEFAULT_TMPDIR: &str = "/tmp";
pub const DEFAULT_THREADS: usize = 8;
pub const DEFAULT_ASSUMED_DEPTH: f64 = 50.0;
pub const DEFAULT_MIN_Q30_PERCENT: f64 = 80.0;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ToolsFile {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub download: Option<ToolEntry>,
    #[serde(default)]
    pub stat: Option<ToolEntry>,
    #[serde(default)]
    pub trim: Option<ToolEntry>,
    #[serde(default)]
    pub assemble: Option<ToolEntry>,
    #[serde(default)]
    pub assembler_depth: Option<u32>,
    #[serde(default)]
    pub min_read_length: Option<u32>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ToolEntry {
    Shorthand(String),
    Detailed(ToolEntryObject),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ToolEntryObject {
    pub program: String,
    #[serde(default)]
    pub extra_args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSpec {
    pub program: String,
    pub extra_args: Vec<String>,
}

impl ToolSpec {
    fn named(program: &str) -> Self {
        Self {
            program: program.to_string(),
            extra_args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolsConfig {
    pub schema_version: u32,
    pub download: ToolSpec,
    pub stat: ToolSpec,
    pub trim: ToolSpec,
    pub assemble: ToolSpec,
    /// Subsampling depth passed to the assembler's `--depth`.
    pub assembler_depth: u32,
    pub min_read_length: u32,
}

impl ToolsConfig {
    pub fn tool(&self, stage: Stage) -> &ToolSpec {
        match stage {
            Stage::Download => &self.download,
            Stage::Stat => &self.stat,
            Stage::Trim => &self.trim,
            Stage::Assemble => &self.assemble,
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            schema_version: 1,
            download: ToolSpec::named("fastq-dump"),
            stat: ToolSpec::named("sra-stat"),
            trim: ToolSpec::named("fastp"),
            assemble: ToolSpec::named("shovill"),
            assembler_depth: 80,
            min_read_length: 36,
        }
    }
}

pub struct ToolsConfigLoader;

impl ToolsConfigLoader {
    /// Resolves tool settings from an explicit path, then `sra-assembler.json`
    /// in the working directory, then the user config directory. Falls back to
    /// built-in defaults when none exists.
    pub fn resolve(path: Option<&Path>) -> Result<ToolsConfig, AssemblerError> {
        let config_path = match path {
            Some(path) => Some(path.to_path_buf()),
            None => Self::discover(),
        };

        let Some(config_path) = config_path else {
            tracing::debug!("no tools config found, using defaults");
            return Ok(ToolsConfig::default());
        };

        tracing::debug!(path = %config_path.display(), "loading tools config");
        let content = fs::read_to_string(&config_path)
            .map_err(|_| AssemblerError::ConfigRead(config_path.clone()))?;
        let file: ToolsFile = serde_json::from_str(&content)
            .map_err(|err| AssemblerError::ConfigParse(err.to_string()))?;

        Self::resolve_file(file)
    }

    pub fn resolve_file(file: ToolsFile) -> Result<ToolsConfig, AssemblerError> {
        let defaults = ToolsConfig::default();
        let resolve = |entry: Option<ToolEntry>, fallback: ToolSpec| -> Result<ToolSpec, AssemblerError> {
            let spec = match entry {
                None => fallback,
                Some(ToolEntry::Shorthand(program)) => ToolSpec {
                    program,
                    extra_args: Vec::new(),
                },
                Some(ToolEntry::Detailed(obj)) => ToolSpec {
                    program: obj.program,
                    extra_args: obj.extra_args,
                },
            };
            if spec.program.trim().is_empty() {
                return Err(AssemblerError::ConfigParse(
                    "tool program must not be empty".to_string(),
                ));
            }
            Ok(spec)
        };

        let assembler_depth = file.assembler_depth.unwrap_or(defaults.assembler_depth);
        if assembler_depth == 0 {
            return Err(AssemblerError::ConfigParse(
                "assembler_depth must be positive".to_string(),
            ));
        }

        Ok(ToolsConfig {
            schema_version: file.schema_version.unwrap_or(1),
            download: resolve(file.download, defaults.download)?,
            stat: resolve(file.stat, defaults.stat)?,
            trim: resolve(file.trim, defaults.trim)?,
            assemble: resolve(file.assemble, defaults.assemble)?,
            assembler_depth,
            min_read_length: file.min_read_length.unwrap_or(defaults.min_read_length),
        })
    }

    fn discover() -> Option<PathBuf> {
        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.exists() {
            return Some(local);
        }
        ProjectDirs::from("", "", "sra-assembler")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
            .filter(|path| path.exists())
    }
}

/// Raw command-line values before validation.
#[derive(Debug, Clone)]
pub struct RunArgs {
    pub accession: String,
    pub outdir: PathBuf,
    pub tmpdir: PathBuf,
    pub gsize: Option<String>,
    pub threads: usize,
    pub keep_workspace: bool,
    pub assumed_depth: f64,
    pub min_q30_percent: f64,
}

impl RunArgs {
    pub fn new(accession: impl Into<String>, outdir: impl Into<PathBuf>) -> Self {
        Self {
            accession: accession.into(),
            outdir: outdir.into(),
            tmpdir: PathBuf::from(DEFAULT_TMPDIR),
            gsize: None,
            threads: DEFAULT_THREADS,
            keep_workspace: false,
            assumed_depth: DEFAULT_ASSUMED_DEPTH,
            min_q30_percent: DEFAULT_MIN_Q30_PERCENT,
        }
    }
}

/// Validated, immutable settings for one pipeline run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub accession: Accession,
    pub outdir: Utf8PathBuf,
    pub tmpdir: Utf8PathBuf,
    pub genome_size: Option<GenomeSize>,
    pub threads: usize,
    pub keep_workspace: bool,
    pub assumed_depth: f64,
    pub min_q30_percent: f64,
    pub tools: ToolsConfig,
}

impl RunConfig {
    /// Validates arguments and prepares the output directory. Nothing here
    /// touches the external tools.
    pub fn from_args(args: RunArgs, tools: ToolsConfig) -> Result<Self, AssemblerError> {
        let accession: Accession = args.accession.parse()?;

        let genome_size = match args.gsize.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(value) => Some(value.parse::<GenomeSize>()?),
        };

        if args.threads == 0 {
            return Err(AssemblerError::Configuration(
                "threads must be a positive integer".to_string(),
            ));
        }
        if !(args.assumed_depth.is_finite() && args.assumed_depth > 0.0) {
            return Err(AssemblerError::Configuration(format!(
                "depth must be positive, got {}",
                args.assumed_depth
            )));
        }
        if !(0.0..=100.0).contains(&args.min_q30_percent) {
            return Err(AssemblerError::Configuration(format!(
                "min-q30 must be between 0 and 100, got {}",
                args.min_q30_percent
            )));
        }

        let tmpdir = utf8_path(args.tmpdir, "tmpdir")?;
        if !tmpdir.as_std_path().is_dir() {
            return Err(AssemblerError::Configuration(format!(
                "tmpdir {tmpdir} is not a directory"
            )));
        }
        ensure_writable(&tmpdir, "tmpdir")?;

        let outdir = utf8_path(args.outdir, "outdir")?;
        fs::create_dir_all(outdir.as_std_path()).map_err(|err| {
            AssemblerError::Configuration(format!("cannot create outdir {outdir}: {err}"))
        })?;
        ensure_writable(&outdir, "outdir")?;

        Ok(Self {
            accession,
            outdir,
            tmpdir,
            genome_size,
            threads: args.threads,
            keep_workspace: args.keep_workspace,
            assumed_depth: args.assumed_depth,
            min_q30_percent: args.min_q30_percent,
            tools,
        })
    }
}

fn utf8_path(path: PathBuf, label: &str) -> Result<Utf8PathBuf, AssemblerError> {
    Utf8PathBuf::from_path_buf(path).map_err(|path| {
        AssemblerError::Configuration(format!("{label} {} is not valid UTF-8", path.display()))
    })
}

fn ensure_writable(dir: &Utf8Path, label: &str) -> Result<(), AssemblerError> {
    tempfile::tempfile_in(dir.as_std_path())
        .map(drop)
        .map_err(|err| AssemblerError::Configuration(format!("{label} {dir} is not writable: {err}")))
}
