use std::io::{self, Write};

use serde::Serialize;

use crate::pipeline::{ProgressEvent, ProgressSink, RunSummary};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Human,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_summary(summary: &RunSummary) -> io::Result<()> {
        Self::print_json(summary)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Prints one line per stage transition to stderr.
pub struct ConsoleSink;

impl ProgressSink for ConsoleSink {
    fn event(&self, event: ProgressEvent) {
        let stage = event.stage.map(|stage| stage.as_str()).unwrap_or("setup");
        match event.elapsed {
            Some(elapsed) => eprintln!(
                "[{stage}] {} ({:.1}s)",
                event.message,
                elapsed.as_secs_f64()
            ),
            None => eprintln!("[{stage}] {}", event.message),
        }
    }
}

pub fn print_summary(summary: &RunSummary) {
    let green = "\x1b[32m";
    let red = "\x1b[31m";
    let cyan = "\x1b[36m";
    let reset = "\x1b[0m";

    println!("{cyan}sra-assembler summary for {}{reset}", summary.accession);
    match &summary.published {
        Some(published) => {
            println!("{green}state: {}{reset}", summary.state);
            println!("{green}contigs: {}{reset}", published.contigs);
            println!("{green}assembly: {}{reset}", published.assembly_dir);
        }
        None => {
            println!("{red}state: {} (reached {}){reset}", summary.state, summary.reached);
            if let Some(error) = &summary.error {
                println!("{red}error: {error}{reset}");
            }
        }
    }
    if let (Some(size), Some(source)) = (&summary.genome_size, summary.genome_size_source) {
        println!("genome size: {size} ({source:?})");
    }
    for record in &summary.stages {
        println!("  {:<9} {:>8.1}s", record.stage.as_str(), record.elapsed_secs);
    }
    if let Some(path) = &summary.workspace {
        println!("workspace kept at {path}");
    }
}
