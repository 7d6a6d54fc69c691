use camino::Utf8PathBuf;

use crate::config::{RunConfig, ToolSpec, ToolsConfig};
use crate::domain::{GenomeSize, Stage};
use crate::error::AssemblerError;
use crate::runner::{StageCommand, find_in_path};
use crate::workspace::Workspace;

/// Where each stage reads and writes inside the workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePaths {
    pub raw_dir: Utf8PathBuf,
    pub raw_r1: Utf8PathBuf,
    pub raw_r2: Utf8PathBuf,
    pub stat_report: Utf8PathBuf,
    pub trimmed_r1: Utf8PathBuf,
    pub trimmed_r2: Utf8PathBuf,
    pub trim_json: Utf8PathBuf,
    pub trim_html: Utf8PathBuf,
    pub assembly_dir: Utf8PathBuf,
    pub assembler_tmp: Utf8PathBuf,
    pub contigs: Utf8PathBuf,
}

impl StagePaths {
    pub fn new(workspace: &Workspace, accession: &str) -> Self {
        let raw_dir = workspace.raw_dir();
        let trimmed = workspace.trimmed_dir();
        let assembly_dir = workspace.assembly_dir();
        Self {
            raw_r1: raw_dir.join(format!("{accession}_1.fastq")),
            raw_r2: raw_dir.join(format!("{accession}_2.fastq")),
            raw_dir,
            stat_report: workspace.stats_dir().join(format!("{accession}.xml")),
            trimmed_r1: trimmed.join("R1.fastq"),
            trimmed_r2: trimmed.join("R2.fastq"),
            trim_json: trimmed.join("fastp.json"),
            trim_html: trimmed.join("fastp.html"),
            contigs: assembly_dir.join("contigs.fa"),
            assembly_dir,
            assembler_tmp: workspace.assembler_tmp_dir(),
        }
    }
}

/// Builds the four tool invocations for one run.
#[derive(Debug, Clone)]
pub struct StagePlan {
    accession: String,
    threads: usize,
    tools: ToolsConfig,
    paths: StagePaths,
}

impl StagePlan {
    pub fn new(config: &RunConfig, workspace: &Workspace) -> Self {
        Self {
            accession: config.accession.as_str().to_string(),
            threads: config.threads,
            tools: config.tools.clone(),
            paths: StagePaths::new(workspace, config.accession.as_str()),
        }
    }

    pub fn paths(&self) -> &StagePaths {
        &self.paths
    }

    /// `fastq-dump --split-e --outdir <raw> <accession>`
    pub fn download(&self) -> StageCommand {
        let tool = &self.tools.download;
        let mut args = strings(["--split-e", "--outdir", self.paths.raw_dir.as_str()]);
        args.extend(tool.extra_args.iter().cloned());
        args.push(self.accession.clone());
        command(
            Stage::Download,
            tool,
            args,
            vec![self.paths.raw_r1.clone(), self.paths.raw_r2.clone()],
            None,
        )
    }

    /// `sra-stat -xse 2 <accession>`; the XML report arrives on stdout.
    pub fn stat(&self) -> StageCommand {
        let tool = &self.tools.stat;
        let mut args = strings(["-xse", "2"]);
        args.extend(tool.extra_args.iter().cloned());
        args.push(self.accession.clone());
        command(
            Stage::Stat,
            tool,
            args,
            vec![self.paths.stat_report.clone()],
            Some(self.paths.stat_report.clone()),
        )
    }

    pub fn trim(&self) -> StageCommand {
        let tool = &self.tools.trim;
        let paths = &self.paths;
        let mut args = strings([
            "-i",
            paths.raw_r1.as_str(),
            "-I",
            paths.raw_r2.as_str(),
            "-o",
            paths.trimmed_r1.as_str(),
            "-O",
            paths.trimmed_r2.as_str(),
        ]);
        args.extend([
            "--length_required".to_string(),
            self.tools.min_read_length.to_string(),
            "--cut_front".to_string(),
            "3".to_string(),
            "--cut_tail".to_string(),
            "3".to_string(),
            "--thread".to_string(),
            self.threads.to_string(),
            "--detect_adapter_for_pe".to_string(),
            "-j".to_string(),
            paths.trim_json.to_string(),
            "-h".to_string(),
            paths.trim_html.to_string(),
        ]);
        args.extend(tool.extra_args.iter().cloned());
        command(
            Stage::Trim,
            tool,
            args,
            vec![
                paths.trimmed_r1.clone(),
                paths.trimmed_r2.clone(),
                paths.trim_json.clone(),
                paths.trim_html.clone(),
            ],
            None,
        )
    }

    /// The genome size is required here: there is no code path that invokes
    /// the assembler without one.
    pub fn assemble(&self, genome_size: &GenomeSize) -> StageCommand {
        let tool = &self.tools.assemble;
        let paths = &self.paths;
        let mut args = strings([
            "--R1",
            paths.trimmed_r1.as_str(),
            "--R2",
            paths.trimmed_r2.as_str(),
            "--outdir",
            paths.assembly_dir.as_str(),
        ]);
        args.extend([
            "--depth".to_string(),
            self.tools.assembler_depth.to_string(),
            "--tmpdir".to_string(),
            paths.assembler_tmp.to_string(),
            "--cpus".to_string(),
            self.threads.to_string(),
            "--force".to_string(),
            "--noreadcorr".to_string(),
            "--nostitch".to_string(),
            "--gsize".to_string(),
            genome_size.as_str().to_string(),
        ]);
        args.extend(tool.extra_args.iter().cloned());
        command(Stage::Assemble, tool, args, vec![paths.contigs.clone()], None)
    }
}

/// Fails with `MissingTool` for the first configured program that cannot be
/// found, before any stage runs.
pub fn require_tools(tools: &ToolsConfig) -> Result<(), AssemblerError> {
    for stage in Stage::ALL {
        let program = &tools.tool(stage).program;
        match find_in_path(program) {
            Some(path) => tracing::debug!(%stage, path = %path.display(), "tool located"),
            None => {
                return Err(AssemblerError::MissingTool(format!(
                    "{program} ({stage} stage)"
                )));
            }
        }
    }
    Ok(())
}

fn command(
    stage: Stage,
    tool: &ToolSpec,
    args: Vec<String>,
    expected: Vec<Utf8PathBuf>,
    stdout_path: Option<Utf8PathBuf>,
) -> StageCommand {
    StageCommand {
        stage,
        program: tool.program.clone(),
        args,
        cwd: None,
        expected,
        stdout_path,
    }
}

fn strings<const N: usize>(values: [&str; N]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}
