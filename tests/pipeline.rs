use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Mutex;

use assert_matches::assert_matches;

use sra_assembler::config::{RunArgs, RunConfig, ToolsConfig};
use sra_assembler::domain::{GenomeSize, GenomeSizeSource, PipelineState, Stage};
use sra_assembler::error::{AssemblerError, EstimationError};
use sra_assembler::estimate::{DepthEstimator, GenomeSizeEstimator};
use sra_assembler::pipeline::{Pipeline, ProgressEvent, ProgressSink};
use sra_assembler::runner::{CommandExecutor, ProcessOutput, StageCommand};
use sra_assembler::workspace::CleanupSlot;

const PAIRED_10MB: &str = r#"<Run accession="SRR000001" spot_count="33333" base_count="10000000">
  <Statistics nreads="2" nspots="33333">
    <Read index="0" count="33333" average="150" stdev="0"/>
    <Read index="1" count="33333" average="150" stdev="0"/>
  </Statistics>
  <QualityCount>
    <Quality value="20" count="1000000"/>
    <Quality value="35" count="9000000"/>
  </QualityCount>
</Run>
"#;

#[derive(Default)]
struct MockExecutor {
    stat_report: String,
    exit_codes: HashMap<Stage, i32>,
    silent: HashSet<Stage>,
    commands: Mutex<Vec<StageCommand>>,
}

impl MockExecutor {
    fn with_report(report: &str) -> Self {
        Self {
            stat_report: report.to_string(),
            ..Self::default()
        }
    }

    fn stages(&self) -> Vec<Stage> {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .map(|command| command.stage)
            .collect()
    }

    fn command(&self, stage: Stage) -> Option<StageCommand> {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .find(|command| command.stage == stage)
            .cloned()
    }
}

impl CommandExecutor for MockExecutor {
    fn execute(&self, command: &StageCommand) -> io::Result<ProcessOutput> {
        self.commands.lock().unwrap().push(command.clone());

        // Partial output is written even when the tool then fails.
        if !self.silent.contains(&command.stage) {
            for path in &command.expected {
                if command.stdout_path.as_ref() == Some(path) {
                    continue;
                }
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent.as_std_path())?;
                }
                fs::write(path.as_std_path(), b">contig_1\nACGT\n")?;
            }
        }

        let code = self.exit_codes.get(&command.stage).copied().unwrap_or(0);
        let stdout = if command.stage == Stage::Stat {
            self.stat_report.clone()
        } else {
            String::new()
        };
        Ok(ProcessOutput {
            code: Some(code),
            stdout,
            stderr: if code == 0 {
                String::new()
            } else {
                format!("{} exploded", command.program)
            },
        })
    }
}

/// Fires the interrupt cleanup while the download is running, then reports
/// the tool as killed.
struct InterruptingExecutor {
    slot: CleanupSlot,
    removed: Mutex<Option<String>>,
}

impl CommandExecutor for InterruptingExecutor {
    fn execute(&self, _command: &StageCommand) -> io::Result<ProcessOutput> {
        let removed = self.slot.cleanup().map(|path| path.to_string());
        *self.removed.lock().unwrap() = removed;
        Ok(ProcessOutput {
            code: None,
            stdout: String::new(),
            stderr: "killed".to_string(),
        })
    }
}

struct CountingEstimator {
    inner: DepthEstimator,
    calls: Mutex<usize>,
}

impl CountingEstimator {
    fn new(depth: f64) -> Self {
        Self {
            inner: DepthEstimator::new(depth),
            calls: Mutex::new(0),
        }
    }

    fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl GenomeSizeEstimator for CountingEstimator {
    fn estimate(&self, report_text: &str) -> Result<GenomeSize, EstimationError> {
        *self.calls.lock().unwrap() += 1;
        self.inner.estimate(report_text)
    }
}

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl ProgressSink for RecordingSink {
    fn event(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}

fn config(root: &Path, gsize: Option<&str>) -> RunConfig {
    let tmpdir = root.join("tmp");
    fs::create_dir_all(&tmpdir).unwrap();
    let mut args = RunArgs::new("SRR000001", root.join("out"));
    args.tmpdir = tmpdir;
    args.gsize = gsize.map(str::to_string);
    args.threads = 2;
    RunConfig::from_args(args, ToolsConfig::default()).unwrap()
}

fn workspace_count(config: &RunConfig) -> usize {
    fs::read_dir(config.tmpdir.as_std_path()).unwrap().count()
}

fn gsize_arg(command: &StageCommand) -> Option<String> {
    let index = command.args.iter().position(|arg| arg == "--gsize")?;
    command.args.get(index + 1).cloned()
}

#[test]
fn autodetected_size_reaches_assembler() {
    let temp = tempfile::tempdir().unwrap();
    let config = config(temp.path(), None);
    let executor = MockExecutor::with_report(PAIRED_10MB);
    let estimator = CountingEstimator::new(50.0);
    let sink = RecordingSink::default();

    let outcome = Pipeline::new(&executor, &estimator).run(&config, &sink);

    assert!(outcome.succeeded(), "{:?}", outcome.error);
    assert_eq!(estimator.calls(), 1);
    assert_eq!(executor.stages(), Stage::ALL.to_vec());
    let assemble = executor.command(Stage::Assemble).unwrap();
    assert_eq!(gsize_arg(&assemble).as_deref(), Some("0.2M"));

    let summary = &outcome.summary;
    assert_eq!(summary.state, PipelineState::Assembled);
    assert_eq!(summary.genome_size.as_deref(), Some("0.2M"));
    assert_eq!(summary.genome_size_source, Some(GenomeSizeSource::Estimated));
    assert_eq!(summary.stages.len(), 4);
    assert!(config.outdir.join("contigs.fa").as_std_path().is_file());
    assert!(config.outdir.join("assembly/contigs.fa").as_std_path().is_file());
    assert_eq!(workspace_count(&config), 0);
    assert!(sink.events.lock().unwrap().len() >= 8);
}

#[test]
fn supplied_size_skips_estimation() {
    let temp = tempfile::tempdir().unwrap();
    let config = config(temp.path(), Some("3.2M"));
    let executor = MockExecutor::with_report(PAIRED_10MB);
    let estimator = CountingEstimator::new(50.0);

    let outcome = Pipeline::new(&executor, &estimator).run(&config, &RecordingSink::default());

    assert!(outcome.succeeded(), "{:?}", outcome.error);
    assert_eq!(estimator.calls(), 0);
    let assemble = executor.command(Stage::Assemble).unwrap();
    assert_eq!(gsize_arg(&assemble).as_deref(), Some("3.2M"));
    assert_eq!(outcome.summary.genome_size_source, Some(GenomeSizeSource::User));
}

#[test]
fn supplied_size_tolerates_unreadable_report() {
    let temp = tempfile::tempdir().unwrap();
    let config = config(temp.path(), Some("5M"));
    let executor = MockExecutor::with_report("");
    let estimator = CountingEstimator::new(50.0);

    let outcome = Pipeline::new(&executor, &estimator).run(&config, &RecordingSink::default());

    assert!(outcome.succeeded(), "{:?}", outcome.error);
    assert_eq!(estimator.calls(), 0);
    assert_eq!(executor.stages().last(), Some(&Stage::Assemble));
}

#[test]
fn download_failure_stops_everything() {
    let temp = tempfile::tempdir().unwrap();
    let config = config(temp.path(), None);
    let mut executor = MockExecutor::with_report(PAIRED_10MB);
    executor.exit_codes.insert(Stage::Download, 3);
    let estimator = CountingEstimator::new(50.0);

    let outcome = Pipeline::new(&executor, &estimator).run(&config, &RecordingSink::default());

    assert!(!outcome.succeeded());
    assert_eq!(outcome.summary.state, PipelineState::Failed);
    assert_eq!(outcome.summary.reached, PipelineState::Init);
    assert_eq!(outcome.summary.failed_stage, Some(Stage::Download));
    assert_eq!(executor.stages(), vec![Stage::Download]);
    assert_eq!(estimator.calls(), 0);
    assert_eq!(workspace_count(&config), 0);
    assert_matches!(
        outcome.error,
        Some(AssemblerError::StageExecution { stage: Stage::Download, stderr: Some(ref text), .. })
            if text.contains("fastq-dump exploded")
    );
}

#[test]
fn empty_report_fails_before_assembly() {
    let temp = tempfile::tempdir().unwrap();
    let config = config(temp.path(), None);
    let executor = MockExecutor::with_report("");
    let estimator = CountingEstimator::new(50.0);

    let outcome = Pipeline::new(&executor, &estimator).run(&config, &RecordingSink::default());

    assert_eq!(outcome.summary.state, PipelineState::Failed);
    assert_eq!(outcome.summary.reached, PipelineState::Statted);
    assert_eq!(outcome.summary.failed_stage, Some(Stage::Stat));
    assert!(!executor.stages().contains(&Stage::Assemble));
    assert_eq!(workspace_count(&config), 0);
    assert!(!config.outdir.join("contigs.fa").as_std_path().exists());
    assert_matches!(
        outcome.into_result(),
        Err(AssemblerError::Estimation(EstimationError::EmptyReport))
    );
}

#[test]
fn report_without_base_counts_fails_estimation() {
    let temp = tempfile::tempdir().unwrap();
    let config = config(temp.path(), None);
    let executor = MockExecutor::with_report(r#"<Run accession="SRR000001"><Statistics nreads="2"/></Run>"#);

    let outcome =
        Pipeline::new(&executor, DepthEstimator::new(50.0)).run(&config, &RecordingSink::default());

    assert_matches!(
        outcome.error,
        Some(AssemblerError::Estimation(EstimationError::MissingField(_)))
    );
    assert!(!executor.stages().contains(&Stage::Assemble));
}

#[test]
fn silent_trim_failure_is_detected() {
    let temp = tempfile::tempdir().unwrap();
    let config = config(temp.path(), None);
    let mut executor = MockExecutor::with_report(PAIRED_10MB);
    executor.silent.insert(Stage::Trim);

    let outcome =
        Pipeline::new(&executor, DepthEstimator::new(50.0)).run(&config, &RecordingSink::default());

    assert_eq!(outcome.summary.reached, PipelineState::Statted);
    assert_eq!(outcome.summary.genome_size.as_deref(), Some("0.2M"));
    assert_matches!(
        outcome.error,
        Some(AssemblerError::StageExecution { stage: Stage::Trim, ref message, .. })
            if message.contains("did not produce")
    );
    assert_eq!(executor.stages().last(), Some(&Stage::Trim));
}

#[test]
fn failed_assembly_publishes_nothing() {
    let temp = tempfile::tempdir().unwrap();
    let config = config(temp.path(), Some("3.2M"));
    let mut executor = MockExecutor::with_report(PAIRED_10MB);
    executor.exit_codes.insert(Stage::Assemble, 255);

    let outcome =
        Pipeline::new(&executor, DepthEstimator::new(50.0)).run(&config, &RecordingSink::default());

    assert_eq!(outcome.summary.state, PipelineState::Failed);
    assert_eq!(outcome.summary.reached, PipelineState::Trimmed);
    assert!(outcome.summary.published.is_none());
    assert!(!config.outdir.join("assembly").as_std_path().exists());
    assert!(!config.outdir.join("contigs.fa").as_std_path().exists());
    assert_eq!(workspace_count(&config), 0);
}

#[test]
fn low_quality_reads_are_rejected_before_trimming() {
    let temp = tempfile::tempdir().unwrap();
    let config = config(temp.path(), None);
    let report = PAIRED_10MB.replace("value=\"35\"", "value=\"25\"");
    let executor = MockExecutor::with_report(&report);

    let outcome =
        Pipeline::new(&executor, DepthEstimator::new(50.0)).run(&config, &RecordingSink::default());

    assert_matches!(outcome.error, Some(AssemblerError::ReadQualityRejected(_)));
    assert_eq!(executor.stages(), vec![Stage::Download, Stage::Stat]);
}

#[test]
fn variable_layout_is_rejected_with_supplied_size() {
    let temp = tempfile::tempdir().unwrap();
    let config = config(temp.path(), Some("3.2M"));
    let report = PAIRED_10MB.replace("nreads=\"2\"", "nreads=\"variable\"");
    let executor = MockExecutor::with_report(&report);
    let estimator = CountingEstimator::new(50.0);

    let outcome = Pipeline::new(&executor, &estimator).run(&config, &RecordingSink::default());

    assert_eq!(estimator.calls(), 0);
    assert_eq!(outcome.summary.reached, PipelineState::Statted);
    assert_matches!(
        outcome.error,
        Some(AssemblerError::ReadQualityRejected(ref msg)) if msg.contains("not paired-end")
    );
    assert_eq!(executor.stages(), vec![Stage::Download, Stage::Stat]);
    assert_eq!(workspace_count(&config), 0);
}

#[test]
fn keep_retains_workspace() {
    let temp = tempfile::tempdir().unwrap();
    let tmpdir = temp.path().join("tmp");
    fs::create_dir_all(&tmpdir).unwrap();
    let mut args = RunArgs::new("SRR000001", temp.path().join("out"));
    args.tmpdir = tmpdir;
    args.keep_workspace = true;
    let config = RunConfig::from_args(args, ToolsConfig::default()).unwrap();
    let mut executor = MockExecutor::with_report(PAIRED_10MB);
    executor.exit_codes.insert(Stage::Trim, 1);

    let outcome =
        Pipeline::new(&executor, DepthEstimator::new(50.0)).run(&config, &RecordingSink::default());

    assert_eq!(outcome.summary.state, PipelineState::Failed);
    let kept = outcome.summary.workspace.clone().unwrap();
    assert!(Path::new(&kept).join("raw/SRR000001_1.fastq").is_file());
    assert_eq!(workspace_count(&config), 1);
}

#[test]
fn interrupt_cleanup_removes_live_workspace() {
    let temp = tempfile::tempdir().unwrap();
    let config = config(temp.path(), None);
    let slot = CleanupSlot::new();
    let executor = InterruptingExecutor {
        slot: slot.clone(),
        removed: Mutex::new(None),
    };

    let outcome = Pipeline::new(&executor, DepthEstimator::new(50.0))
        .with_cleanup(slot.clone())
        .run(&config, &RecordingSink::default());

    let removed = executor.removed.lock().unwrap().clone().unwrap();
    assert!(removed.starts_with(config.tmpdir.as_str()));
    assert!(removed.contains("SRR000001"));
    assert_eq!(outcome.summary.failed_stage, Some(Stage::Download));
    assert_eq!(workspace_count(&config), 0);
    assert_eq!(slot.registered(), None);
}

#[test]
fn cleanup_slot_is_empty_after_run_and_skips_kept_workspaces() {
    let temp = tempfile::tempdir().unwrap();
    let config = config(temp.path(), None);
    let slot = CleanupSlot::new();
    let executor = MockExecutor::with_report(PAIRED_10MB);

    let outcome = Pipeline::new(&executor, DepthEstimator::new(50.0))
        .with_cleanup(slot.clone())
        .run(&config, &RecordingSink::default());
    assert!(outcome.succeeded(), "{:?}", outcome.error);
    assert_eq!(slot.registered(), None);

    let mut kept_config = config.clone();
    kept_config.keep_workspace = true;
    let executor = InterruptingExecutor {
        slot: slot.clone(),
        removed: Mutex::new(None),
    };
    let outcome = Pipeline::new(&executor, DepthEstimator::new(50.0))
        .with_cleanup(slot)
        .run(&kept_config, &RecordingSink::default());

    assert_eq!(*executor.removed.lock().unwrap(), None);
    let kept = outcome.summary.workspace.unwrap();
    assert!(Path::new(&kept).is_dir());
}
