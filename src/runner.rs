use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;

use crate::domain::Stage;
use crate::error::AssemblerError;

const STDERR_TAIL_LINES: usize = 20;

/// One fully resolved external tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageCommand {
    pub stage: Stage,
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<Utf8PathBuf>,
    /// Files the tool must leave behind for the stage to count as successful.
    pub expected: Vec<Utf8PathBuf>,
    /// When set, captured stdout is written here before artifacts are checked.
    pub stdout_path: Option<Utf8PathBuf>,
}

impl StageCommand {
    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

pub trait CommandExecutor {
    fn execute(&self, command: &StageCommand) -> io::Result<ProcessOutput>;
}

impl<T: CommandExecutor + ?Sized> CommandExecutor for &T {
    fn execute(&self, command: &StageCommand) -> io::Result<ProcessOutput> {
        (**self).execute(command)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemExecutor;

impl CommandExecutor for SystemExecutor {
    fn execute(&self, command: &StageCommand) -> io::Result<ProcessOutput> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args);
        if let Some(dir) = &command.cwd {
            cmd.current_dir(dir.as_std_path());
        }
        let output = cmd.output()?;
        Ok(ProcessOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct StageResult {
    pub stage: Stage,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub artifacts: Vec<Utf8PathBuf>,
    pub elapsed: Duration,
}

pub struct StageRunner<E: CommandExecutor> {
    executor: E,
}

impl<E: CommandExecutor> StageRunner<E> {
    pub fn new(executor: E) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Runs the command once and classifies the outcome. A non-zero exit is a
    /// failure whatever is on disk; a zero exit with a missing artifact is a
    /// silent tool failure.
    pub fn run(&self, command: &StageCommand) -> Result<StageResult, AssemblerError> {
        let stage = command.stage;
        tracing::debug!(%stage, command = %command.command_line(), "running stage command");
        let started = Instant::now();
        let output = self
            .executor
            .execute(command)
            .map_err(|err| AssemblerError::StageExecution {
                stage,
                message: format!("failed to start {}: {err}", command.program),
                stderr: None,
            })?;
        let elapsed = started.elapsed();

        if !output.success() {
            let status = match output.code {
                Some(code) => format!("exit status {code}"),
                None => "termination by signal".to_string(),
            };
            return Err(AssemblerError::StageExecution {
                stage,
                message: format!("{} failed with {status}", command.program),
                stderr: stderr_tail(&output.stderr),
            });
        }

        if let Some(path) = &command.stdout_path {
            fs::write(path.as_std_path(), output.stdout.as_bytes()).map_err(|err| {
                AssemblerError::StageExecution {
                    stage,
                    message: format!("cannot write captured output to {path}: {err}"),
                    stderr: None,
                }
            })?;
        }

        let missing: Vec<&Utf8PathBuf> = command
            .expected
            .iter()
            .filter(|path| !path.as_std_path().exists())
            .collect();
        if !missing.is_empty() {
            let names = missing
                .iter()
                .map(|path| path.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(AssemblerError::StageExecution {
                stage,
                message: format!(
                    "{} exited successfully but did not produce {names}",
                    command.program
                ),
                stderr: stderr_tail(&output.stderr),
            });
        }

        Ok(StageResult {
            stage,
            exit_code: output.code,
            stdout: output.stdout,
            stderr: output.stderr,
            artifacts: command.expected.clone(),
            elapsed,
        })
    }
}

fn stderr_tail(stderr: &str) -> Option<String> {
    let lines: Vec<&str> = stderr.trim().lines().collect();
    if lines.is_empty() {
        return None;
    }
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    Some(lines[start..].join("\n"))
}

/// Looks a program up the way a shell would: paths with a separator are
/// checked directly, bare names are searched in `PATH`.
pub fn find_in_path(name: &str) -> Option<PathBuf> {
    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let path_var = std::env::var_os("PATH")?;
    for path in std::env::split_paths(&path_var) {
        let plain = path.join(name);
        if plain.is_file() {
            return Some(plain);
        }
        let exe = path.join(format!("{name}.exe"));
        if exe.is_file() {
            return Some(exe);
        }
    }
    None
}
