use std::fs;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::RunConfig;
use crate::domain::{GenomeSize, GenomeSizeSource, PipelineState, Stage};
use crate::error::AssemblerError;
use crate::estimate::GenomeSizeEstimator;
use crate::publish::{Published, Publisher};
use crate::runner::{CommandExecutor, StageCommand, StageResult, StageRunner};
use crate::stages::StagePlan;
use crate::stat::{StatReport, check_read_quality};
use crate::workspace::{CleanupSlot, Workspace};

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub stage: Option<Stage>,
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Debug, Clone, Serialize)]
pub struct StageRecord {
    pub stage: Stage,
    pub exit_code: Option<i32>,
    pub elapsed_secs: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub accession: String,
    pub state: PipelineState,
    /// Furthest state reached before the run ended.
    pub reached: PipelineState,
    pub failed_stage: Option<Stage>,
    pub error: Option<String>,
    pub genome_size: Option<String>,
    pub genome_size_source: Option<GenomeSizeSource>,
    pub stages: Vec<StageRecord>,
    pub workspace: Option<String>,
    pub published: Option<Published>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct RunOutcome {
    pub summary: RunSummary,
    pub error: Option<AssemblerError>,
}

impl RunOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none() && self.summary.state == PipelineState::Assembled
    }

    pub fn into_result(self) -> Result<RunSummary, AssemblerError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.summary),
        }
    }
}

/// Drives download, stat, trim and assemble in that order for one accession.
pub struct Pipeline<E: CommandExecutor, G: GenomeSizeEstimator> {
    runner: StageRunner<E>,
    estimator: G,
    cleanup: Option<CleanupSlot>,
}

impl<E: CommandExecutor, G: GenomeSizeEstimator> Pipeline<E, G> {
    pub fn new(executor: E, estimator: G) -> Self {
        Self {
            runner: StageRunner::new(executor),
            estimator,
            cleanup: None,
        }
    }

    /// Publishes the live workspace path into `slot` for the duration of a
    /// run. Kept workspaces are never registered.
    pub fn with_cleanup(mut self, slot: CleanupSlot) -> Self {
        self.cleanup = Some(slot);
        self
    }

    /// Runs the whole pipeline. The workspace is released on every path
    /// before this returns; the outcome always carries a summary, and an
    /// error when the run ended in FAILED.
    pub fn run(&self, config: &RunConfig, sink: &dyn ProgressSink) -> RunOutcome {
        let mut tracker = Tracker::new(config);
        tracing::info!(accession = %config.accession, "starting pipeline");

        let workspace = match Workspace::acquire(&config.tmpdir, &config.accession) {
            Ok(workspace) => workspace,
            Err(err) => return tracker.finish(Err(err), None),
        };
        sink.event(ProgressEvent {
            stage: None,
            message: format!("workspace {}", workspace.root()),
            elapsed: None,
        });

        if let Some(slot) = self.cleanup.as_ref().filter(|_| !config.keep_workspace) {
            slot.register(workspace.root());
        }

        let result = self.drive(config, &workspace, &mut tracker, sink);
        if let Some(slot) = &self.cleanup {
            slot.clear();
        }
        let kept = workspace.release(config.keep_workspace);
        tracker.finish(result, kept.map(|path| path.to_string()))
    }

    fn drive(
        &self,
        config: &RunConfig,
        workspace: &Workspace,
        tracker: &mut Tracker,
        sink: &dyn ProgressSink,
    ) -> Result<Published, AssemblerError> {
        let plan = StagePlan::new(config, workspace);
        let paths = plan.paths();

        self.execute(&plan.download(), tracker, sink)?;
        self.execute(&plan.stat(), tracker, sink)?;

        let report_text = fs::read_to_string(paths.stat_report.as_std_path()).map_err(|err| {
            AssemblerError::StageExecution {
                stage: Stage::Stat,
                message: format!("cannot read report {}: {err}", paths.stat_report),
                stderr: None,
            }
        })?;
        let (genome_size, source) = self.resolve_genome_size(config, &report_text)?;
        tracker.genome_size = Some((genome_size.clone(), source));
        apply_read_gates(&report_text, config.min_q30_percent)?;

        self.execute(&plan.trim(), tracker, sink)?;
        self.execute(&plan.assemble(&genome_size), tracker, sink)?;

        Publisher::new(&config.outdir).publish(&paths.assembly_dir, &paths.contigs)
    }

    /// The override always wins; the estimator only runs without one.
    fn resolve_genome_size(
        &self,
        config: &RunConfig,
        report_text: &str,
    ) -> Result<(GenomeSize, GenomeSizeSource), AssemblerError> {
        if let Some(size) = &config.genome_size {
            tracing::info!(gsize = %size, "using supplied genome size");
            return Ok((size.clone(), GenomeSizeSource::User));
        }
        let size = self.estimator.estimate(report_text)?;
        tracing::info!(gsize = %size, depth = config.assumed_depth, "estimated genome size");
        Ok((size, GenomeSizeSource::Estimated))
    }

    fn execute(
        &self,
        command: &StageCommand,
        tracker: &mut Tracker,
        sink: &dyn ProgressSink,
    ) -> Result<StageResult, AssemblerError> {
        let stage = command.stage;
        debug_assert_eq!(tracker.state.next_stage(), Some(stage));
        sink.event(ProgressEvent {
            stage: Some(stage),
            message: format!("running {}", command.program),
            elapsed: None,
        });

        let result = self.runner.run(command)?;
        tracker.complete(&result);
        tracing::info!(%stage, state = %tracker.state, elapsed = ?result.elapsed, "stage finished");
        sink.event(ProgressEvent {
            stage: Some(stage),
            message: format!("{stage} done"),
            elapsed: Some(result.elapsed),
        });
        Ok(result)
    }
}

/// Read-set gates from the statistics report. With a supplied genome size the
/// report may be unparseable; the gates are then skipped.
fn apply_read_gates(report_text: &str, min_q30_percent: f64) -> Result<(), AssemblerError> {
    match StatReport::parse(report_text) {
        Ok(report) => check_read_quality(&report, min_q30_percent),
        Err(err) => {
            tracing::warn!(error = %err, "skipping read quality checks");
            Ok(())
        }
    }
}

struct Tracker {
    accession: String,
    state: PipelineState,
    stages: Vec<StageRecord>,
    genome_size: Option<(GenomeSize, GenomeSizeSource)>,
    started_at: DateTime<Utc>,
}

impl Tracker {
    fn new(config: &RunConfig) -> Self {
        Self {
            accession: config.accession.to_string(),
            state: PipelineState::Init,
            stages: Vec::new(),
            genome_size: None,
            started_at: Utc::now(),
        }
    }

    fn complete(&mut self, result: &StageResult) {
        self.state = result.stage.completes();
        self.stages.push(StageRecord {
            stage: result.stage,
            exit_code: result.exit_code,
            elapsed_secs: result.elapsed.as_secs_f64(),
        });
    }

    fn finish(
        self,
        result: Result<Published, AssemblerError>,
        workspace: Option<String>,
    ) -> RunOutcome {
        let (state, published, error) = match result {
            Ok(published) => (self.state, Some(published), None),
            Err(err) => {
                tracing::error!(state = %self.state, error = %err, "pipeline failed");
                (PipelineState::Failed, None, Some(err))
            }
        };
        let failed_stage = error.as_ref().and_then(|err| err.stage());
        let (genome_size, genome_size_source) = match self.genome_size {
            Some((size, source)) => (Some(size.to_string()), Some(source)),
            None => (None, None),
        };
        RunOutcome {
            summary: RunSummary {
                accession: self.accession,
                state,
                reached: self.state,
                failed_stage,
                error: error.as_ref().map(|err| err.to_string()),
                genome_size,
                genome_size_source,
                stages: self.stages,
                workspace,
                published,
                started_at: self.started_at,
                finished_at: Utc::now(),
            },
            error,
        }
    }
}
