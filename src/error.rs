use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use crate::domain::Stage;

#[derive(Debug, Error, Diagnostic)]
pub enum AssemblerError {
    #[error("invalid run accession: {0}")]
    #[diagnostic(help("expected an SRA/ENA/DDBJ run accession such as SRR000001"))]
    InvalidAccession(String),

    #[error("invalid genome size: {0}")]
    #[diagnostic(help("use a number with an optional K, M or G suffix, e.g. 3.2M"))]
    InvalidGenomeSize(String),

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("required tool not found: {0}")]
    MissingTool(String),

    #[error("workspace error: {0}")]
    Workspace(String),

    #[error("{stage} stage failed: {message}")]
    StageExecution {
        stage: Stage,
        message: String,
        #[help]
        stderr: Option<String>,
    },

    #[error("genome size estimation failed: {0}")]
    #[diagnostic(help("pass --gsize to skip autodetection"))]
    Estimation(#[from] EstimationError),

    #[error("reads rejected: {0}")]
    ReadQualityRejected(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl AssemblerError {
    pub fn stage(&self) -> Option<Stage> {
        match self {
            AssemblerError::StageExecution { stage, .. } => Some(*stage),
            AssemblerError::Estimation(_) | AssemblerError::ReadQualityRejected(_) => {
                Some(Stage::Stat)
            }
            _ => None,
        }
    }
}

/// Failure to turn a statistics report into a genome size.
///
/// The stat stage itself succeeded when one of these is raised; it is the
/// interpretation of its report that failed.
#[derive(Debug, Error, Diagnostic, Clone, PartialEq)]
pub enum EstimationError {
    #[error("statistics report is empty")]
    EmptyReport,

    #[error("statistics report is missing {0}")]
    MissingField(&'static str),

    #[error("statistics report has a malformed {field}: {value}")]
    MalformedField { field: &'static str, value: String },

    #[error("statistics report counts zero bases")]
    NoBases,

    #[error("assumed sequencing depth must be positive, got {0}")]
    InvalidDepth(f64),
}
