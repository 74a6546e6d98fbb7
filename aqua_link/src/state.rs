//! Device-side state of the simulator and its on-disk form.

use aqua_core::util::{format_device_time, parse_device_timestamp};
use aqua_core::{DeviceConfig, LogEntry, StatusSnapshot, parse_dose_log};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

use crate::atomic::write_atomic;
use crate::error::{Result, SimError};

/// Knobs for driving failure paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimBehaviour {
    /// Never answer `CFG_GET`.
    pub silent_config: bool,
    /// Lose the link after this many notifications have been delivered.
    pub drop_after_notifications: Option<usize>,
    /// Refuse to connect.
    pub fail_connect: bool,
}

/// What the simulated device knows.
#[derive(Debug, Clone)]
pub struct SimState {
    pub name: String,
    pub config: DeviceConfig,
    pub logs: Vec<LogEntry>,
    pub clock: NaiveDateTime,
    pub status: StatusSnapshot,
    pub chunk_size: usize,
    pub behaviour: SimBehaviour,
}

impl SimState {
    pub fn new(clock: NaiveDateTime) -> Self {
        Self {
            name: "AquaBalancePro".to_string(),
            config: DeviceConfig::default(),
            logs: Vec::new(),
            clock,
            status: StatusSnapshot {
                time: Some(format_device_time(clock)),
                wifi_connected: false,
                wifi_rssi: Some(0),
                wifi_ip: Some(String::new()),
                ap_ssid: Some("AquaBalancePro".to_string()),
                ap_ip: Some("192.168.4.1".to_string()),
                backend_ready: false,
            },
            chunk_size: 20,
            behaviour: SimBehaviour::default(),
        }
    }

    /// Status document as the firmware would notify it.
    pub fn status_document(&self) -> Value {
        serde_json::json!({
            "time": format_device_time(self.clock),
            "wifi": {
                "connected": self.status.wifi_connected,
                "rssi": self.status.wifi_rssi.unwrap_or(0),
                "ip": self.status.wifi_ip.clone().unwrap_or_default(),
            },
            "ap": {
                "ssid": self.status.ap_ssid.clone().unwrap_or_default(),
                "ip": self.status.ap_ip.clone().unwrap_or_default(),
            },
            "firebase": { "ready": self.status.backend_ready },
        })
    }

    /// Dispense and log. Stock never goes below zero.
    pub fn dispense(&mut self, pump_id: u8, dose_ml: f64, origin: &str) {
        if let Some(p) = self.config.pump_mut(pump_id) {
            if p.stock_ml > 0.0 {
                p.stock_ml = (p.stock_ml - dose_ml).max(0.0);
            }
        }
        self.logs.push(LogEntry {
            timestamp: self.clock,
            pump_id,
            dose_ml,
            origin: origin.to_string(),
        });
    }

    pub fn to_persisted(&self) -> DeviceState {
        DeviceState {
            config: self.config.to_document(),
            logs: self
                .logs
                .iter()
                .map(|e| e.to_device_value(&self.config))
                .collect(),
            clock: format_device_time(self.clock),
        }
    }

    pub fn from_persisted(state: &DeviceState) -> Result<Self> {
        let clock = parse_device_timestamp(&state.clock)
            .ok_or_else(|| SimError::Clock(state.clock.clone()))?;
        let config = DeviceConfig::from_document(&state.config)
            .map_err(|e| SimError::State(e.to_string()))?;
        let logs = parse_dose_log(&Value::Array(state.logs.clone()), &config)
            .map_err(|e| SimError::State(e.to_string()))?;
        let mut sim = Self::new(clock);
        sim.config = config;
        sim.logs = logs;
        Ok(sim)
    }
}

/// Persisted device: configuration document, log export and clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceState {
    pub config: Value,
    #[serde(default)]
    pub logs: Vec<Value>,
    pub clock: String,
}

impl DeviceState {
    pub fn from_json(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Persist atomically so an interrupted run never leaves a torn file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut text = self.to_json_pretty()?;
        text.push('\n');
        write_atomic(path, text.as_bytes())?;
        Ok(())
    }
}
