use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;

use clap::Parser;
use miette::IntoDiagnostic;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use sra_assembler::config::{
    DEFAULT_ASSUMED_DEPTH, DEFAULT_MIN_Q30_PERCENT, DEFAULT_THREADS, DEFAULT_TMPDIR, RunArgs,
    RunConfig, ToolsConfigLoader,
};
use sra_assembler::error::AssemblerError;
use sra_assembler::estimate::DepthEstimator;
use sra_assembler::output::{ConsoleSink, JsonOutput, OutputMode, print_summary};
use sra_assembler::pipeline::{Pipeline, RunOutcome};
use sra_assembler::publish::Publisher;
use sra_assembler::runner::SystemExecutor;
use sra_assembler::stages::require_tools;
use sra_assembler::workspace::CleanupSlot;

const LOG_FILE_NAME: &str = "runner.log";
const INTERRUPTED_EXIT_CODE: i32 = 130;

#[derive(Parser)]
#[command(name = "sra-assembler")]
#[command(about = "Assemble a bacterial genome from an SRA/ENA run accession")]
#[command(version, author)]
struct Cli {
    #[arg(help = "Run accession (SRR, ERR or DRR)")]
    accession: String,

    #[arg(long, help = "Output folder")]
    outdir: PathBuf,

    #[arg(long, default_value = DEFAULT_TMPDIR, help = "Directory for the per-run workspace")]
    tmpdir: PathBuf,

    #[arg(
        long,
        default_value = "",
        help = "Estimated genome size, e.g. 3.2M; blank to autodetect"
    )]
    gsize: String,

    #[arg(long, default_value_t = DEFAULT_THREADS, help = "Threads for trimming and assembly")]
    threads: usize,

    #[arg(long, help = "Keep the workspace after the run")]
    keep_tmp: bool,

    #[arg(
        long,
        default_value_t = DEFAULT_ASSUMED_DEPTH,
        help = "Assumed sequencing depth for genome size autodetection"
    )]
    depth: f64,

    #[arg(
        long = "min-q30",
        default_value_t = DEFAULT_MIN_Q30_PERCENT,
        help = "Minimum percentage of Q30 bases; 0 disables the check"
    )]
    min_q30: f64,

    #[arg(long, help = "Tools config file (JSON)")]
    config: Option<PathBuf>,

    #[arg(long, help = "Print the run summary as JSON")]
    json: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.outdir);

    if let Err(report) = run(cli) {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<AssemblerError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &AssemblerError) -> u8 {
    match error {
        AssemblerError::InvalidAccession(_)
        | AssemblerError::InvalidGenomeSize(_)
        | AssemblerError::Configuration(_)
        | AssemblerError::ConfigRead(_)
        | AssemblerError::ConfigParse(_)
        | AssemblerError::MissingTool(_) => 2,
        AssemblerError::Workspace(_) => 3,
        AssemblerError::StageExecution { .. } => 4,
        AssemblerError::Estimation(_) => 5,
        AssemblerError::ReadQualityRejected(_) => 6,
        AssemblerError::Filesystem(_) => 7,
    }
}

/// Logs go to stderr and, when the output folder can be created, to
/// `runner.log` inside it.
fn init_tracing(outdir: &Path) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = fmt::layer().with_target(false).with_writer(io::stderr);
    let file_layer = open_log_file(outdir).ok().map(|file| {
        fmt::layer()
            .with_ansi(false)
            .with_target(false)
            .with_writer(Mutex::new(file))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
}

/// Repeated runs into one output folder share a single log.
fn open_log_file(outdir: &Path) -> io::Result<File> {
    fs::create_dir_all(outdir)?;
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(outdir.join(LOG_FILE_NAME))
}

/// On SIGINT, SIGTERM or SIGHUP the live workspace is removed before exiting.
fn install_interrupt_handler(cleanup: CleanupSlot) {
    let installed = ctrlc::set_handler(move || {
        if let Some(path) = cleanup.cleanup() {
            tracing::warn!(path = %path, "interrupted, workspace removed");
        }
        std::process::exit(INTERRUPTED_EXIT_CODE);
    });
    if let Err(err) = installed {
        tracing::warn!(error = %err, "cannot install interrupt handler");
    }
}

fn run(cli: Cli) -> miette::Result<()> {
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };

    let tools = ToolsConfigLoader::resolve(cli.config.as_deref())?;
    let args = RunArgs {
        accession: cli.accession,
        outdir: cli.outdir,
        tmpdir: cli.tmpdir,
        gsize: Some(cli.gsize),
        threads: cli.threads,
        keep_workspace: cli.keep_tmp,
        assumed_depth: cli.depth,
        min_q30_percent: cli.min_q30,
    };
    let config = RunConfig::from_args(args, tools)?;
    require_tools(&config.tools)?;

    let cleanup = CleanupSlot::new();
    install_interrupt_handler(cleanup.clone());
    let pipeline = Pipeline::new(SystemExecutor, DepthEstimator::new(config.assumed_depth))
        .with_cleanup(cleanup);
    let outcome: RunOutcome = match output_mode {
        OutputMode::Json => pipeline.run(&config, &JsonOutput),
        OutputMode::Human => pipeline.run(&config, &ConsoleSink),
    };

    if let Err(err) = Publisher::new(&config.outdir).write_summary(&outcome.summary) {
        tracing::warn!(error = %err, "failed to write run summary");
    }
    match output_mode {
        OutputMode::Json => JsonOutput::print_summary(&outcome.summary).into_diagnostic()?,
        OutputMode::Human => print_summary(&outcome.summary),
    }

    outcome.into_result()?;
    Ok(())
}
