//! Typed view of the `sra-stat -xse 2` XML report.
//!
//! Only the handful of elements the pipeline reads are extracted:
//!
//! ```text
//! <Run accession="SRR000001" spot_count="..." base_count="...">
//!   <Statistics nreads="2" nspots="...">
//!     <Read index="0" count="..." average="150" stdev="0"/>
//!   </Statistics>
//!   <QualityCount>
//!     <Quality value="30" count="..."/>
//!   </QualityCount>
//! </Run>
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{AssemblerError, EstimationError};

/// Reads per spot as `Statistics nreads` states it. sra-stat writes
/// `variable` when spots carry differing read counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Fixed(u32),
    Variable,
}

impl Layout {
    fn from_attr(value: &str) -> Self {
        match value.trim().parse() {
            Ok(reads) => Layout::Fixed(reads),
            Err(_) => Layout::Variable,
        }
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layout::Fixed(reads) => write!(f, "{reads} reads per spot"),
            Layout::Variable => write!(f, "variable reads per spot"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatReport {
    pub total_bases: u64,
    pub layout: Option<Layout>,
    pub mean_read_lengths: Vec<u32>,
    /// `(phred score, base count)` pairs in report order.
    pub quality_counts: Vec<(u32, u64)>,
}

impl StatReport {
    pub fn parse(text: &str) -> Result<Self, EstimationError> {
        if text.trim().is_empty() {
            return Err(EstimationError::EmptyReport);
        }

        let mut quality_counts = Vec::new();
        for attrs in elements(text, "Quality") {
            let score = number_attr::<u32>(&attrs, "value", "quality value")?;
            let count = number_attr::<u64>(&attrs, "count", "quality count")?;
            if let (Some(score), Some(count)) = (score, count) {
                quality_counts.push((score, count));
            }
        }

        let total_bases = if quality_counts.is_empty() {
            let run_bases = elements(text, "Run")
                .into_iter()
                .next()
                .map(|attrs| number_attr::<u64>(&attrs, "base_count", "base count"))
                .transpose()?
                .flatten();
            run_bases.ok_or(EstimationError::MissingField("total base count"))?
        } else {
            quality_counts.iter().map(|(_, count)| count).sum()
        };

        let layout = elements(text, "Statistics")
            .into_iter()
            .next()
            .and_then(|attrs| attrs.get("nreads").map(|value| Layout::from_attr(value)));

        let mut mean_read_lengths = Vec::new();
        for attrs in elements(text, "Read") {
            if let Some(average) = attrs.get("average") {
                let parsed: f64 = average.parse().map_err(|_| EstimationError::MalformedField {
                    field: "mean read length",
                    value: average.clone(),
                })?;
                mean_read_lengths.push(parsed.round() as u32);
            }
        }

        Ok(Self {
            total_bases,
            layout,
            mean_read_lengths,
            quality_counts,
        })
    }

    pub fn is_paired(&self) -> Option<bool> {
        self.layout.map(|layout| layout == Layout::Fixed(2))
    }

    /// Share of bases at or above `min_score`, in percent. `None` without a
    /// quality histogram.
    pub fn high_quality_percent(&self, min_score: u32) -> Option<f64> {
        let total: u64 = self.quality_counts.iter().map(|(_, count)| count).sum();
        if total == 0 {
            return None;
        }
        let high: u64 = self
            .quality_counts
            .iter()
            .filter(|(score, _)| *score >= min_score)
            .map(|(_, count)| count)
            .sum();
        Some(high as f64 / total as f64 * 100.0)
    }
}

/// Pre-assembly gates on the read set: paired layout and Q30 share. A zero
/// threshold disables the Q30 gate; the layout gate always applies since
/// trimming and assembly take read pairs.
pub fn check_read_quality(report: &StatReport, min_q30_percent: f64) -> Result<(), AssemblerError> {
    match report.layout {
        Some(Layout::Fixed(2)) => {}
        Some(layout) => {
            return Err(AssemblerError::ReadQualityRejected(format!(
                "layout is not paired-end ({layout})"
            )));
        }
        None => {
            return Err(AssemblerError::ReadQualityRejected(
                "report does not state the read layout".to_string(),
            ));
        }
    }

    if min_q30_percent > 0.0 {
        let percent = report.high_quality_percent(30).ok_or_else(|| {
            AssemblerError::ReadQualityRejected("report has no quality histogram".to_string())
        })?;
        if percent < min_q30_percent {
            return Err(AssemblerError::ReadQualityRejected(format!(
                "q30 bases {percent:.1}% < {min_q30_percent}%"
            )));
        }
        tracing::debug!(q30 = percent, "read quality accepted");
    }
    Ok(())
}

fn elements(text: &str, name: &str) -> Vec<HashMap<String, String>> {
    static TAG: OnceLock<Regex> = OnceLock::new();
    let tag = TAG.get_or_init(|| {
        Regex::new(r"<([A-Za-z_][\w.-]*)\b([^>]*)>").expect("pattern is valid")
    });
    tag.captures_iter(text)
        .filter(|cap| &cap[1] == name)
        .map(|cap| attributes(&cap[2]))
        .collect()
}

fn attributes(raw: &str) -> HashMap<String, String> {
    static ATTR: OnceLock<Regex> = OnceLock::new();
    let attr = ATTR.get_or_init(|| {
        Regex::new(r#"([A-Za-z_][\w.-]*)\s*=\s*"([^"]*)""#).expect("pattern is valid")
    });
    attr.captures_iter(raw)
        .map(|cap| (cap[1].to_string(), cap[2].to_string()))
        .collect()
}

fn number_attr<T: std::str::FromStr>(
    attrs: &HashMap<String, String>,
    key: &str,
    field: &'static str,
) -> Result<Option<T>, EstimationError> {
    attrs
        .get(key)
        .map(|value| {
            value
                .trim()
                .parse::<T>()
                .map_err(|_| EstimationError::MalformedField {
                    field,
                    value: value.clone(),
                })
        })
        .transpose()
}
