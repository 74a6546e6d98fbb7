#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas for the AquaDoser link tools.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - Every section has defaults, so an empty file yields a working setup
//!   against the reference firmware.
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use uuid::Uuid;

/// Service and characteristic identifiers of the reference firmware.
pub const DEFAULT_SERVICE_UUID: Uuid = uuid::uuid!("12345678-1234-5678-1234-56789abcdef0");
pub const DEFAULT_TIME_UUID: Uuid = uuid::uuid!("abcd1234-5678-90ab-cdef-1234567890ab");
pub const DEFAULT_CONFIG_UUID: Uuid = uuid::uuid!("dcba4321-8765-4321-abcd-0987654321ef");
pub const DEFAULT_TEST_UUID: Uuid = uuid::uuid!("efab4321-8765-4321-abcd-0987654321ff");

/// Largest data frame we accept configuring; GATT payloads never get near it.
pub const MAX_CHUNK_SIZE: usize = 512;

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LinkCfg {
    /// Device the tools connect to.
    pub device_id: String,
    /// Fallback display name when the peer does not advertise one.
    pub device_name: String,
    pub service_uuid: Uuid,
    /// Time-sync channel; also carries unsolicited status notifications.
    pub time_uuid: Uuid,
    /// Chunked configuration channel.
    pub config_uuid: Uuid,
    /// Dose-test channel.
    pub test_uuid: Uuid,
}

impl Default for LinkCfg {
    fn default() -> Self {
        Self {
            device_id: "sim-aquabalance".to_string(),
            device_name: "AquaBalancePro".to_string(),
            service_uuid: DEFAULT_SERVICE_UUID,
            time_uuid: DEFAULT_TIME_UUID,
            config_uuid: DEFAULT_CONFIG_UUID,
            test_uuid: DEFAULT_TEST_UUID,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TransferCfg {
    /// Bytes per data frame.
    pub chunk_size: usize,
    /// Pause after each uploaded data frame (ms).
    pub inter_frame_delay_ms: u64,
    /// Reassembly ceiling for one inbound document.
    pub max_document_bytes: usize,
}

impl Default for TransferCfg {
    fn default() -> Self {
        Self {
            chunk_size: 20,
            inter_frame_delay_ms: 15,
            max_document_bytes: 8192,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct FetchCfg {
    /// Deadline for a configuration read (ms).
    pub timeout_ms: u64,
    /// Sleep between link polls while waiting (ms).
    pub poll_interval_ms: u64,
}

impl Default for FetchCfg {
    fn default() -> Self {
        Self {
            timeout_ms: 6000,
            poll_interval_ms: 5,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TimelineCfg {
    /// Max clock distance between a schedule and the executed dose (minutes).
    pub match_window_min: u32,
    /// Max dose difference between a schedule and the executed dose (ml).
    pub dose_tolerance_ml: f64,
    /// Log origins that are manual tests and never appear on the timeline.
    pub manual_origins: Vec<String>,
}

impl Default for TimelineCfg {
    fn default() -> Self {
        Self {
            match_window_min: 30,
            dose_tolerance_ml: 0.05,
            manual_origins: [
                "teste",
                "teste rapido",
                "teste rápido",
                "quick test",
                "test",
                "calibracao",
                "calibração",
                "calibration",
            ]
            .iter()
            .map(|s| (*s).to_string())
            .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CalibrationCfg {
    /// Volume the pump is asked to dispense during calibration (ml).
    pub reference_dose_ml: f64,
}

impl Default for CalibrationCfg {
    fn default() -> Self {
        Self {
            reference_dose_ml: 1.0,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub link: LinkCfg,
    pub transfer: TransferCfg,
    pub fetch: FetchCfg,
    pub timeline: TimelineCfg,
    pub calibration: CalibrationCfg,
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Read, parse and validate a config file.
pub fn load_file(path: &Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read config {:?}: {}", path, e))?;
    let cfg = load_toml(&text)
        .map_err(|e| eyre::eyre!("invalid configuration {:?}: {}", path, e))?;
    cfg.validate()?;
    Ok(cfg)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Link
        if self.link.device_id.trim().is_empty() {
            eyre::bail!("link.device_id must not be empty");
        }
        let channels = [
            self.link.time_uuid,
            self.link.config_uuid,
            self.link.test_uuid,
        ];
        let unique: HashSet<&Uuid> = channels.iter().collect();
        if unique.len() != channels.len() {
            eyre::bail!("link channel uuids must be distinct");
        }

        // Transfer
        if self.transfer.chunk_size == 0 {
            eyre::bail!("transfer.chunk_size must be >= 1");
        }
        if self.transfer.chunk_size > MAX_CHUNK_SIZE {
            eyre::bail!("transfer.chunk_size must be <= {MAX_CHUNK_SIZE}");
        }
        if self.transfer.max_document_bytes < self.transfer.chunk_size {
            eyre::bail!("transfer.max_document_bytes must be >= transfer.chunk_size");
        }
        if self.transfer.inter_frame_delay_ms > 1000 {
            eyre::bail!("transfer.inter_frame_delay_ms is unreasonably large (>1s)");
        }

        // Fetch
        if self.fetch.timeout_ms == 0 {
            eyre::bail!("fetch.timeout_ms must be >= 1");
        }
        if self.fetch.timeout_ms > 10 * 60 * 1000 {
            eyre::bail!("fetch.timeout_ms is unreasonably large (>10min)");
        }
        if self.fetch.poll_interval_ms == 0 {
            eyre::bail!("fetch.poll_interval_ms must be >= 1");
        }
        if self.fetch.poll_interval_ms >= self.fetch.timeout_ms {
            eyre::bail!("fetch.poll_interval_ms must be < fetch.timeout_ms");
        }

        // Timeline
        if !self.timeline.dose_tolerance_ml.is_finite() || self.timeline.dose_tolerance_ml < 0.0 {
            eyre::bail!("timeline.dose_tolerance_ml must be a finite value >= 0");
        }
        if self.timeline.match_window_min > 12 * 60 {
            eyre::bail!("timeline.match_window_min must be <= 720");
        }

        // Calibration
        if !(self.calibration.reference_dose_ml.is_finite()
            && self.calibration.reference_dose_ml > 0.0)
        {
            eyre::bail!("calibration.reference_dose_ml must be > 0");
        }

        // Logging
        if let Some(rotation) = self.logging.rotation.as_deref()
            && !matches!(rotation, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly, got {rotation:?}");
        }

        Ok(())
    }
}
