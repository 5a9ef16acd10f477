//! ABOUTME: Command-line surface for the pipeline: a thin wiring entry point, not the
//! ABOUTME: HTTP surface (§1 Out of scope) that owns uploads and job status endpoints

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Trace level for logging output, mirroring the RUST_LOG > --trace priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TraceLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<TraceLevel> for tracing::Level {
    fn from(trace_level: TraceLevel) -> Self {
        match trace_level {
            TraceLevel::Off | TraceLevel::Error => tracing::Level::ERROR,
            TraceLevel::Warn => tracing::Level::WARN,
            TraceLevel::Info => tracing::Level::INFO,
            TraceLevel::Debug => tracing::Level::DEBUG,
            TraceLevel::Trace => tracing::Level::TRACE,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "docflow", about = "Runs the document processing pipeline outside the HTTP surface")]
pub struct Cli {
    /// Path to a TOML config file layered over the built-in defaults.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbosity when RUST_LOG is not set.
    #[arg(long, value_enum, default_value_t = TraceLevel::Warn, global = true)]
    pub trace: TraceLevel,

    /// Skip Postgres/HTTP collaborators and run entirely against in-memory
    /// fakes plus a local hash embedder. Useful for smoke-testing the
    /// orchestrator wiring without live dependencies.
    #[arg(long, global = true)]
    pub local: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Runs one document through ingestion, validation, persistence,
    /// classification, and vectorization, printing the finished job.
    ProcessDoc {
        /// URL or object-store reference the converter should fetch.
        #[arg(long)]
        source: String,

        #[arg(long)]
        user_id: String,

        #[arg(long)]
        filename: Option<String>,
    },

    /// Fetches and prints a previously created job by id.
    ShowJob {
        #[arg(long)]
        job_id: String,
    },
}
