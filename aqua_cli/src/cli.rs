//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "aqua", version, about = "AquaBalancePro doser link CLI")]
pub struct Cli {
    /// Path to config TOML (typed); built-in defaults when omitted
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Simulated device state (JSON: config, logs, clock); created on first write
    #[arg(long = "device-state", value_name = "FILE")]
    pub device_state: Option<PathBuf>,

    /// Print results and errors as JSON lines
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "warn")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Read the pump configuration from the device
    FetchConfig,
    /// Upload a pump configuration document
    PushConfig {
        /// JSON document with `bombas`
        #[arg(long, value_name = "FILE")]
        file: PathBuf,
    },
    /// Wait for the next unsolicited status notification
    Status,
    /// Set the device clock
    SyncTime {
        /// Time to set as `dd/mm/yyyy hh:mm[:ss]`; local time when omitted
        #[arg(long, value_name = "TIME")]
        at: Option<String>,
    },
    /// Dispense a test dose now
    TestDose {
        /// Pump number (1..=3)
        #[arg(long)]
        pump: u8,
        /// Volume in ml
        #[arg(long, allow_negative_numbers = true)]
        ml: f64,
    },
    /// Dispense the reference dose, then rescale the pump coefficient by the measured volume
    Calibrate {
        /// Pump number (1..=3)
        #[arg(long)]
        pump: u8,
        /// Volume actually collected (ml)
        #[arg(long, allow_negative_numbers = true)]
        measured: f64,
    },
    /// Reconcile today's schedules with the executed doses
    Timeline {
        /// Log export (JSON); the device log when omitted
        #[arg(long, value_name = "FILE")]
        logs: Option<PathBuf>,
        /// Day to reconcile (YYYY-MM-DD); the device date when omitted
        #[arg(long, value_name = "DATE")]
        date: Option<String>,
    },
    /// Print the dose log, newest first
    Logs,
    /// Quick health check (config valid, device answers a fetch)
    SelfCheck,
}
