//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();
/// Effective session policy used for the current run (for JSON details).
pub static LAST_POLICY: OnceLock<CliPolicy> = OnceLock::new();

#[derive(Copy, Clone, Debug)]
pub struct CliPolicy {
    pub timeout_ms: u64,
    pub completion_threshold_l: f64,
    pub max_flow_lpm: f64,
}

#[derive(Parser, Debug)]
#[command(name = "dispense", version, about = "Dispensing station CLI")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/dispense.toml")]
    pub config: PathBuf,

    /// Log as JSON lines instead of pretty
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
    /// Dispense a target volume on one pump
    Run {
        /// Pump channel to drive
        #[arg(long, default_value_t = 1)]
        pump: u8,
        /// Target volume in liters
        #[arg(long, value_name = "LITERS")]
        liters: f64,
        /// Keep the valve open past the target (operator stops manually)
        #[arg(long, action = ArgAction::SetTrue)]
        no_auto_stop: bool,
        /// Override the session timeout in ms (takes precedence over config)
        #[arg(long, value_name = "MS")]
        timeout_ms: Option<u64>,
        /// Override the auto-stop completion threshold in liters
        #[arg(long, value_name = "LITERS")]
        threshold_l: Option<f64>,
        /// Simulated feed rate in liters per minute; 0 stalls the feed
        #[arg(long, value_name = "LPM", default_value_t = 2.0)]
        rate_lpm: f64,
        /// Meter polling rate in Hz (takes precedence over config)
        #[arg(long, value_name = "HZ")]
        poll_hz: Option<u32>,
    },
    /// Quick station check (config, engine build, one meter read)
    SelfCheck,
}
