//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "timbang", version, about = "Posyandu measurement station CLI")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/timbang.toml")]
    pub config: PathBuf,

    /// Optional growth reference CSV (strict header); overrides the config table
    #[arg(long, value_name = "FILE")]
    pub growth_reference: Option<PathBuf>,

    /// Override the SQLite database path from the config
    #[arg(long, value_name = "FILE")]
    pub db: Option<PathBuf>,

    /// Emit results and errors as JSON
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Acquire a stable reading for a subject and commit it
    Measure {
        /// Subject id from the roster
        #[arg(long)]
        subject: i64,
        /// Operator id performing the measurement
        #[arg(long)]
        operator: i64,
        /// Free-form note stored with the record
        #[arg(long)]
        notes: Option<String>,
        /// Override session.max_wait_ms (0 disables the wait bound)
        #[arg(long, value_name = "MS")]
        max_wait_ms: Option<u64>,
        /// Override device.tick_ms for this run
        #[arg(long, value_name = "MS")]
        tick_ms: Option<u64>,
        /// Read the sensor inside the session loop (no ticker thread)
        #[arg(long, action = ArgAction::SetTrue)]
        direct: bool,
    },
    /// Print measurement statistics for the dashboard
    Stats,
    /// Seed the default operator and sample subjects into an empty roster
    Init,
    /// Quick health check (config, store, simulated sensor)
    SelfCheck,
}
