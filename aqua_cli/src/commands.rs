//! Command execution over a session bound to the simulated doser.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use aqua_core::calibration::{CALIBRATION_ORIGIN, recalibrate};
use aqua_core::util::{DEVICE_LOG_FORMAT, format_device_time, parse_device_timestamp};
use aqua_core::{
    DeviceConfig, DoserError, LinkProfile, LogEntry, Session, SessionEvent, TimelineCfg,
    TimelineEvent, parse_dose_log, reconcile, sort_newest_first,
};
use aqua_link::{DeviceState, SimBehaviour, SimHandle, SimState, SimulatedDevice};
use chrono::{Local, NaiveDate};
use eyre::{Result, WrapErr};
use serde_json::{Value, json};

use crate::cli::Commands;

/// Env hook: the device never answers `CFG_GET`.
const ENV_SIM_SILENT: &str = "AQUA_TEST_SIM_SILENT";
/// Env hook: the link is lost after N notifications.
const ENV_SIM_DROP_AFTER: &str = "AQUA_TEST_SIM_DROP_AFTER";

/// Loaded configuration plus the connected session and its simulated peer.
pub struct Runtime {
    cfg: aqua_config::Config,
    state_path: Option<PathBuf>,
    sim: SimHandle,
    session: Session<SimulatedDevice>,
    cancel: Arc<AtomicBool>,
    json: bool,
}

/// Parse and validate the TOML config; built-in defaults when no path is given.
pub fn load_config(path: Option<&Path>) -> Result<aqua_config::Config> {
    path.map_or_else(|| Ok(aqua_config::Config::default()), aqua_config::load_file)
}

fn behaviour_from_env() -> SimBehaviour {
    let silent_config = std::env::var(ENV_SIM_SILENT).is_ok_and(|v| v == "1");
    let drop_after_notifications = std::env::var(ENV_SIM_DROP_AFTER)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok());
    SimBehaviour {
        silent_config,
        drop_after_notifications,
        fail_connect: false,
    }
}

fn load_sim_state(path: Option<&Path>, chunk_size: usize) -> Result<SimState> {
    let mut state = match path {
        Some(p) if p.exists() => {
            let persisted = DeviceState::load(p)
                .wrap_err_with(|| format!("load device state {}", p.display()))?;
            SimState::from_persisted(&persisted)
                .wrap_err_with(|| format!("device state {}", p.display()))?
        }
        _ => SimState::new(Local::now().naive_local()),
    };
    state.chunk_size = chunk_size;
    state.behaviour = behaviour_from_env();
    Ok(state)
}

impl Runtime {
    /// Build the session over the simulator and connect.
    pub fn open(
        cfg: aqua_config::Config,
        state_path: Option<PathBuf>,
        cancel: Arc<AtomicBool>,
        json: bool,
    ) -> Result<Self> {
        let state = load_sim_state(state_path.as_deref(), cfg.transfer.chunk_size)?;
        let profile = LinkProfile::from(&cfg.link);
        let device = SimulatedDevice::new(profile.clone(), state);
        let sim = device.handle();

        let mut session = Session::<SimulatedDevice>::builder()
            .with_link(device)
            .with_profile(profile)
            .with_transfer((&cfg.transfer).into())
            .with_fetch((&cfg.fetch).into())
            .build()?;
        session.subscribe(|event| match event {
            SessionEvent::Connectivity(up) => tracing::debug!(connected = up, "connectivity"),
            SessionEvent::Status(s) => tracing::debug!(time = ?s.time, "status"),
            SessionEvent::Config(c) => tracing::debug!(pumps = c.pumps().len(), "config"),
        });
        session.connect(&cfg.link.device_id)?;

        Ok(Self {
            cfg,
            state_path,
            sim,
            session,
            cancel,
            json,
        })
    }

    /// Write the device state back when a state file is in use.
    fn persist(&self) -> Result<()> {
        let Some(path) = self.state_path.as_deref() else {
            return Ok(());
        };
        self.sim
            .state()
            .to_persisted()
            .save(path)
            .wrap_err_with(|| format!("save device state {}", path.display()))?;
        tracing::debug!(path = %path.display(), "device state saved");
        Ok(())
    }

    fn print(&self, value: Value, human: impl FnOnce() -> String) {
        if self.json {
            println!("{value}");
        } else {
            println!("{}", human());
        }
    }

    fn fetch(&mut self) -> Result<DeviceConfig> {
        Ok(self.session.fetch_config_blocking(Some(&*self.cancel))?)
    }

    pub fn run(&mut self, cmd: &Commands) -> Result<()> {
        match cmd {
            Commands::FetchConfig => self.fetch_config(),
            Commands::PushConfig { file } => self.push_config(file),
            Commands::Status => self.status(),
            Commands::SyncTime { at } => self.sync_time(at.as_deref()),
            Commands::TestDose { pump, ml } => self.test_dose(*pump, *ml),
            Commands::Calibrate { pump, measured } => self.calibrate(*pump, *measured),
            Commands::Timeline { logs, date } => self.timeline(logs.as_deref(), date.as_deref()),
            Commands::Logs => self.logs(),
            Commands::SelfCheck => self.self_check(),
        }
    }

    fn fetch_config(&mut self) -> Result<()> {
        let config = self.fetch()?;
        self.print(
            json!({ "command": "fetch-config", "config": config.to_document() }),
            || describe_config(&config),
        );
        Ok(())
    }

    fn push_config(&mut self, file: &Path) -> Result<()> {
        let text = std::fs::read_to_string(file)
            .wrap_err_with(|| format!("read {}", file.display()))?;
        let doc: Value = serde_json::from_str(&text)
            .map_err(|e| DoserError::Format(format!("{}: {e}", file.display())))?;
        let config = DeviceConfig::from_document(&doc)?;
        self.session.push_config(&config)?;
        self.persist()?;
        self.print(
            json!({ "command": "push-config", "pumps": config.pumps().len() }),
            || format!("Configuration uploaded ({} pumps).", config.pumps().len()),
        );
        Ok(())
    }

    fn status(&mut self) -> Result<()> {
        // The firmware notifies status on its own schedule; prompt one here.
        self.sim.push_status();
        let snapshot = self.session.wait_for_status(Some(&*self.cancel))?;
        let value = serde_json::to_value(&snapshot).wrap_err("encode status")?;
        self.print(json!({ "command": "status", "status": value }), || {
            format!(
                "Device time: {}\nWi-Fi: {} (rssi {}, ip {})\nAccess point: {} ({})\nBackend ready: {}",
                snapshot.time.as_deref().unwrap_or("-"),
                if snapshot.wifi_connected { "connected" } else { "offline" },
                snapshot.wifi_rssi.map_or_else(|| "-".to_string(), |r| r.to_string()),
                snapshot.wifi_ip.as_deref().unwrap_or("-"),
                snapshot.ap_ssid.as_deref().unwrap_or("-"),
                snapshot.ap_ip.as_deref().unwrap_or("-"),
                snapshot.backend_ready,
            )
        });
        Ok(())
    }

    fn sync_time(&mut self, at: Option<&str>) -> Result<()> {
        let at = match at {
            Some(text) => parse_device_timestamp(text).ok_or_else(|| {
                DoserError::InvalidCommand(format!("time {text:?} is not dd/mm/yyyy hh:mm[:ss]"))
            })?,
            None => Local::now().naive_local(),
        };
        self.session.sync_time(at)?;
        self.persist()?;
        let text = format_device_time(at);
        self.print(json!({ "command": "sync-time", "time": text }), || {
            format!("Device clock set to {text}.")
        });
        Ok(())
    }

    fn test_dose(&mut self, pump: u8, ml: f64) -> Result<()> {
        self.session.test_dose(pump, ml)?;
        self.persist()?;
        self.print(
            json!({ "command": "test-dose", "pump": pump, "ml": ml }),
            || format!("Test dose sent: pump {pump}, {ml:.2} ml."),
        );
        Ok(())
    }

    fn calibrate(&mut self, pump: u8, measured: f64) -> Result<()> {
        let current = self.fetch()?;
        let old_coef = current
            .pump(pump)
            .map(|p| p.calibration_coef)
            .ok_or_else(|| DoserError::InvalidCommand(format!("no pump {pump}")))?;
        let reference = self.cfg.calibration.reference_dose_ml;
        let new_coef = recalibrate(old_coef, reference, measured)?;
        let updated = current.with_calibration(pump, new_coef)?;

        self.session
            .test_dose_with_origin(pump, reference, Some(CALIBRATION_ORIGIN))?;
        self.session.push_config(&updated)?;
        self.persist()?;
        tracing::info!(pump, old_coef, new_coef, "pump recalibrated");
        self.print(
            json!({
                "command": "calibrate",
                "pump": pump,
                "reference_ml": reference,
                "measured_ml": measured,
                "old_coef": old_coef,
                "new_coef": new_coef,
            }),
            || format!("Pump {pump}: coefficient {old_coef:.3} -> {new_coef:.3}."),
        );
        Ok(())
    }

    fn timeline(&mut self, logs: Option<&Path>, date: Option<&str>) -> Result<()> {
        let config = self.fetch()?;
        let entries = match logs {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .wrap_err_with(|| format!("read {}", path.display()))?;
                let doc: Value = serde_json::from_str(&text)
                    .map_err(|e| DoserError::Format(format!("{}: {e}", path.display())))?;
                parse_dose_log(&doc, &config)?
            }
            None => self.sim.logs(),
        };
        let day = match date {
            Some(text) => NaiveDate::parse_from_str(text, "%Y-%m-%d").map_err(|_| {
                DoserError::InvalidCommand(format!("date {text:?} is not YYYY-MM-DD"))
            })?,
            None => self.sim.clock().date(),
        };
        let tcfg = TimelineCfg::from(&self.cfg.timeline);
        let events = reconcile(&entries, &config, day, &tcfg);
        let value = serde_json::to_value(&events).wrap_err("encode timeline")?;
        self.print(
            json!({ "command": "timeline", "date": day.to_string(), "events": value }),
            || describe_timeline(day, &events),
        );
        Ok(())
    }

    fn logs(&mut self) -> Result<()> {
        let config = self.sim.config();
        let mut entries = self.sim.logs();
        sort_newest_first(&mut entries);
        let value: Vec<Value> = entries
            .iter()
            .map(|e| e.to_device_value(&config))
            .collect();
        self.print(json!({ "command": "logs", "logs": value }), || {
            describe_logs(&entries, &config)
        });
        Ok(())
    }

    fn self_check(&mut self) -> Result<()> {
        let config = self.fetch()?;
        config.validate()?;
        let name = self
            .session
            .device()
            .map_or_else(|| "-".to_string(), |d| d.name.clone());
        self.print(
            json!({ "command": "self-check", "ok": true, "device": name }),
            || format!("OK: {name} answered with {} pumps.", config.pumps().len()),
        );
        Ok(())
    }

    /// Leave the link cleanly.
    pub fn close(mut self) {
        if let Err(e) = self.session.disconnect() {
            tracing::debug!(error = %e, "disconnect on exit");
        }
    }
}

fn describe_config(config: &DeviceConfig) -> String {
    let mut out = String::new();
    for pump in config.pumps() {
        out.push_str(&format!(
            "{}: coef {:.3}, stock {:.1} ml\n",
            pump.display_name(),
            pump.calibration_coef,
            pump.stock_ml
        ));
        for s in pump.schedules.iter().filter(|s| s.enabled) {
            out.push_str(&format!("  {} {:.2} ml\n", s.time_label(), s.dose_ml));
        }
    }
    out.trim_end().to_string()
}

fn describe_timeline(day: NaiveDate, events: &[TimelineEvent]) -> String {
    if events.is_empty() {
        return format!("{day}: nothing scheduled or dosed.");
    }
    let mut out = format!("{day}:");
    for e in events {
        let state = match (e.is_unmatched_schedule(), &e.matched_scheduled_time) {
            (true, _) => "pending".to_string(),
            (false, Some(t)) => format!("done, schedule {t}"),
            (false, None) => "done".to_string(),
        };
        out.push_str(&format!(
            "\n  {:02}:{:02} pump {} {:.2} ml {} [{state}]",
            e.hour, e.minute, e.pump_id, e.dose_ml, e.origin
        ));
    }
    out
}

fn describe_logs(entries: &[LogEntry], config: &DeviceConfig) -> String {
    if entries.is_empty() {
        return "No doses logged.".to_string();
    }
    entries
        .iter()
        .map(|e| {
            let name = config
                .pump(e.pump_id)
                .map_or_else(|| format!("Bomba {}", e.pump_id), |p| p.display_name());
            format!(
                "{} {} {:.2} ml {}",
                e.timestamp.format(DEVICE_LOG_FORMAT),
                name,
                e.dose_ml,
                e.origin
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
