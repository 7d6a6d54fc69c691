use crate::domain::GenomeSize;
use crate::error::EstimationError;
use crate::stat::StatReport;

/// Derives a genome size from the statistics stage's report text.
pub trait GenomeSizeEstimator {
    fn estimate(&self, report_text: &str) -> Result<GenomeSize, EstimationError>;
}

impl<T: GenomeSizeEstimator + ?Sized> GenomeSizeEstimator for &T {
    fn estimate(&self, report_text: &str) -> Result<GenomeSize, EstimationError> {
        (**self).estimate(report_text)
    }
}

/// `total_bases / depth`, assuming the run was sequenced to a known depth.
#[derive(Debug, Clone, Copy)]
pub struct DepthEstimator {
    pub assumed_depth: f64,
}

impl DepthEstimator {
    pub fn new(assumed_depth: f64) -> Self {
        Self { assumed_depth }
    }
}

impl GenomeSizeEstimator for DepthEstimator {
    fn estimate(&self, report_text: &str) -> Result<GenomeSize, EstimationError> {
        estimate(report_text, self.assumed_depth)
    }
}

pub fn estimate(report_text: &str, depth: f64) -> Result<GenomeSize, EstimationError> {
    let report = StatReport::parse(report_text)?;
    estimate_from_report(&report, depth)
}

pub fn estimate_from_report(report: &StatReport, depth: f64) -> Result<GenomeSize, EstimationError> {
    if !(depth.is_finite() && depth > 0.0) {
        return Err(EstimationError::InvalidDepth(depth));
    }
    if report.total_bases == 0 {
        return Err(EstimationError::NoBases);
    }
    let bases = (report.total_bases as f64 / depth).round() as u64;
    Ok(GenomeSize::from_bases(bases.max(1)))
}
