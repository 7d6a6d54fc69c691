//! Assemble a bacterial genome from a public sequencing-read accession.
//!
//! The pipeline shells out to four tools in a fixed order (download, read
//! statistics, trimming, assembly) inside a per-run scratch workspace, and
//! derives the assembler's genome size from the statistics report unless one
//! is supplied.

pub mod config;
pub mod domain;
pub mod error;
pub mod estimate;
pub mod output;
pub mod pipeline;
pub mod publish;
pub mod runner;
pub mod stages;
pub mod stat;
pub mod workspace;
