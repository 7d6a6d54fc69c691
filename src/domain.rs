use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AssemblerError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Accession(String);

impl Accession {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Accession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Accession {
    type Err = AssemblerError;

    /// Accepts run accessions from the three INSDC archives: `SRR`, `ERR`,
    /// `DRR`. The value must match exactly; case and surrounding whitespace
    /// are not normalized.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let prefix = value.get(..3).unwrap_or_default();
        let digits = value.get(3..).unwrap_or_default();
        let is_valid = matches!(prefix, "SRR" | "ERR" | "DRR")
            && !digits.is_empty()
            && digits.chars().all(|ch| ch.is_ascii_digit());
        if !is_valid {
            return Err(AssemblerError::InvalidAccession(value.to_string()));
        }
        Ok(Self(value.to_string()))
    }
}

/// Genome size handed to the assembler, e.g. `3.2M`.
///
/// A user-supplied size keeps its original spelling so it reaches the
/// assembler verbatim; an estimated size is rendered in megabases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenomeSize {
    text: String,
    bases: u64,
}

impl GenomeSize {
    pub fn from_bases(bases: u64) -> Self {
        let megabases = format_decimal(bases as f64 / 1_000_000.0);
        let text = if megabases == "0" {
            format!("{}K", format_decimal(bases as f64 / 1_000.0))
        } else {
            format!("{megabases}M")
        };
        Self { text, bases }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn bases(&self) -> u64 {
        self.bases
    }
}

impl fmt::Display for GenomeSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

impl FromStr for GenomeSize {
    type Err = AssemblerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let text = value.trim();
        let invalid = || AssemblerError::InvalidGenomeSize(value.to_string());
        let (number, multiplier) = match text.chars().last() {
            Some('K' | 'k') => (&text[..text.len() - 1], 1e3),
            Some('M' | 'm') => (&text[..text.len() - 1], 1e6),
            Some('G' | 'g') => (&text[..text.len() - 1], 1e9),
            Some(_) => (text, 1.0),
            None => return Err(invalid()),
        };
        if number.is_empty() || !number.chars().all(|ch| ch.is_ascii_digit() || ch == '.') {
            return Err(invalid());
        }
        let parsed: f64 = number.parse().map_err(|_| invalid())?;
        let bases = (parsed * multiplier).round();
        if !bases.is_finite() || bases < 1.0 {
            return Err(invalid());
        }
        Ok(Self {
            text: text.to_string(),
            bases: bases as u64,
        })
    }
}

fn format_decimal(value: f64) -> String {
    let formatted = format!("{value:.3}");
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    trimmed.to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenomeSizeSource {
    User,
    Estimated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Download,
    Stat,
    Trim,
    Assemble,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Download, Stage::Stat, Stage::Trim, Stage::Assemble];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Download => "download",
            Stage::Stat => "stat",
            Stage::Trim => "trim",
            Stage::Assemble => "assemble",
        }
    }

    /// State the pipeline enters once this stage succeeds.
    pub fn completes(&self) -> PipelineState {
        match self {
            Stage::Download => PipelineState::Downloaded,
            Stage::Stat => PipelineState::Statted,
            Stage::Trim => PipelineState::Trimmed,
            Stage::Assemble => PipelineState::Assembled,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PipelineState {
    Init,
    Downloaded,
    Statted,
    Trimmed,
    Assembled,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Assembled | PipelineState::Failed)
    }

    /// The only stage allowed to run from this state.
    pub fn next_stage(&self) -> Option<Stage> {
        match self {
            PipelineState::Init => Some(Stage::Download),
            PipelineState::Downloaded => Some(Stage::Stat),
            PipelineState::Statted => Some(Stage::Trim),
            PipelineState::Trimmed => Some(Stage::Assemble),
            PipelineState::Assembled | PipelineState::Failed => None,
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Init => "INIT",
            PipelineState::Downloaded => "DOWNLOADED",
            PipelineState::Statted => "STATTED",
            PipelineState::Trimmed => "TRIMMED",
            PipelineState::Assembled => "ASSEMBLED",
            PipelineState::Failed => "FAILED",
        };
        write!(f, "{name}")
    }
}
