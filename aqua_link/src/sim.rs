//! In-process stand-in for the doser firmware's GATT service.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use aqua_core::codec::{CFG_GET, DecodeEvent, FrameDecoder, FrameEncoder};
use aqua_core::device::PUMP_COUNT;
use aqua_core::util::parse_device_timestamp;
use aqua_core::{DeviceConfig, LinkProfile, LogEntry};
use aqua_traits::{BoxError, CharacteristicHandle, Link, LinkEvent, LinkFault, PeerInfo};
use chrono::{Datelike, NaiveDateTime, Timelike};
use serde_json::Value;
use uuid::Uuid;

use crate::state::SimState;

pub const TIME_HANDLE: CharacteristicHandle = CharacteristicHandle(1);
pub const CONFIG_HANDLE: CharacteristicHandle = CharacteristicHandle(2);
pub const TEST_HANDLE: CharacteristicHandle = CharacteristicHandle(3);

/// Origin the firmware stamps on dose-test entries.
pub const TEST_ORIGIN: &str = "Teste";
/// Origin the firmware stamps on schedule-driven entries.
pub const SCHEDULED_ORIGIN: &str = "Programado";

/// Upload buffer ceiling, as on the device.
const CONFIG_DOC_SIZE: usize = 8192;

struct Inner {
    state: SimState,
    connected: bool,
    subscriptions: HashMap<CharacteristicHandle, u32>,
    journal: Vec<(CharacteristicHandle, Vec<u8>)>,
    outbox: VecDeque<LinkEvent>,
    upload: FrameDecoder,
    delivered: usize,
}

impl Inner {
    fn notify(&mut self, handle: CharacteristicHandle, bytes: Vec<u8>) {
        if !self.connected {
            return;
        }
        if let Some(limit) = self.state.behaviour.drop_after_notifications {
            if self.delivered >= limit {
                tracing::debug!(limit, "simulated link loss");
                self.lose_link();
                return;
            }
        }
        self.delivered += 1;
        self.outbox
            .push_back(LinkEvent::Notification { handle, bytes });
    }

    fn lose_link(&mut self) {
        self.connected = false;
        self.upload.reset();
        self.outbox.push_back(LinkEvent::Disconnected);
    }

    fn on_config_write(&mut self, bytes: &[u8]) {
        if bytes == CFG_GET {
            if self.state.behaviour.silent_config {
                tracing::debug!("CFG_GET swallowed");
                return;
            }
            self.stream_config();
            return;
        }
        match self.upload.push(bytes) {
            DecodeEvent::Document(doc) => match DeviceConfig::from_document(&doc) {
                Ok(cfg) => {
                    tracing::info!("configuration applied");
                    self.state.config = cfg;
                }
                Err(e) => tracing::warn!(error = %e, "uploaded configuration rejected"),
            },
            DecodeEvent::Malformed(e) => tracing::warn!(error = %e, "upload discarded"),
            DecodeEvent::Pending | DecodeEvent::Ignored => {}
        }
    }

    fn stream_config(&mut self) {
        let frames = FrameEncoder::new(self.state.chunk_size.max(1))
            .and_then(|enc| enc.encode(&self.state.config.to_document()));
        match frames {
            Ok(frames) => {
                for f in frames {
                    self.notify(CONFIG_HANDLE, f.as_bytes().to_vec());
                }
            }
            Err(e) => tracing::error!(error = %e, "cannot frame configuration"),
        }
    }

    fn on_time_write(&mut self, bytes: &[u8]) {
        let text = String::from_utf8_lossy(bytes);
        match parse_device_timestamp(&text) {
            Some(dt) => self.state.clock = dt,
            None => tracing::warn!(time = %text, "clock write ignored"),
        }
    }

    fn on_test_write(&mut self, bytes: &[u8]) -> Result<(), LinkFault> {
        let cmd: Value = serde_json::from_slice(bytes)
            .map_err(|e| LinkFault::Gatt(format!("dose command: {e}")))?;
        let pump = cmd.get("bomb").and_then(Value::as_u64).unwrap_or(0);
        let dose = cmd.get("dosagem").and_then(Value::as_f64).unwrap_or(0.0);
        let pump = u8::try_from(pump)
            .ok()
            .filter(|p| (1..=PUMP_COUNT).contains(p));
        let Some(pump) = pump.filter(|_| dose > 0.0) else {
            return Err(LinkFault::Gatt("dose command rejected".into()));
        };
        let origin = cmd
            .get("origem")
            .and_then(Value::as_str)
            .unwrap_or(TEST_ORIGIN)
            .to_string();
        self.state.dispense(pump, dose, &origin);
        Ok(())
    }
}

/// Shared view onto a [`SimulatedDevice`] for tests and the CLI.
#[derive(Clone)]
pub struct SimHandle {
    inner: Rc<RefCell<Inner>>,
}

impl SimHandle {
    pub fn config(&self) -> DeviceConfig {
        self.inner.borrow().state.config.clone()
    }

    pub fn set_config(&self, config: DeviceConfig) {
        self.inner.borrow_mut().state.config = config;
    }

    pub fn document(&self) -> Value {
        self.inner.borrow().state.config.to_document()
    }

    pub fn clock(&self) -> NaiveDateTime {
        self.inner.borrow().state.clock
    }

    pub fn logs(&self) -> Vec<LogEntry> {
        self.inner.borrow().state.logs.clone()
    }

    /// A copy of the whole device state.
    pub fn state(&self) -> SimState {
        self.inner.borrow().state.clone()
    }

    pub fn with_state<R>(&self, f: impl FnOnce(&mut SimState) -> R) -> R {
        f(&mut self.inner.borrow_mut().state)
    }

    /// Notify the current status on the time channel.
    pub fn push_status(&self) {
        let mut inner = self.inner.borrow_mut();
        let doc = inner.state.status_document();
        let bytes = serde_json::to_vec(&doc).unwrap_or_default();
        inner.notify(TIME_HANDLE, bytes);
    }

    pub fn push_raw_status(&self, bytes: &[u8]) {
        self.inner.borrow_mut().notify(TIME_HANDLE, bytes.to_vec());
    }

    /// Notify arbitrary bytes on the config channel.
    pub fn push_config_frame(&self, bytes: &[u8]) {
        self.inner.borrow_mut().notify(CONFIG_HANDLE, bytes.to_vec());
    }

    pub fn drop_link(&self) {
        let mut inner = self.inner.borrow_mut();
        if inner.connected {
            inner.lose_link();
        }
    }

    pub fn is_connected(&self) -> bool {
        self.inner.borrow().connected
    }

    pub fn subscription_count(&self, handle: CharacteristicHandle) -> u32 {
        self.inner
            .borrow()
            .subscriptions
            .get(&handle)
            .copied()
            .unwrap_or(0)
    }

    /// Every write received, in order.
    pub fn journal(&self) -> Vec<(CharacteristicHandle, Vec<u8>)> {
        self.inner.borrow().journal.clone()
    }

    pub fn writes_to(&self, handle: CharacteristicHandle) -> Vec<Vec<u8>> {
        self.inner
            .borrow()
            .journal
            .iter()
            .filter(|(h, _)| *h == handle)
            .map(|(_, b)| b.clone())
            .collect()
    }

    /// Advance the device clock to `at` and run every schedule due at that minute.
    ///
    /// Returns how many doses were dispensed.
    pub fn run_schedules_at(&self, at: NaiveDateTime) -> usize {
        let mut inner = self.inner.borrow_mut();
        inner.state.clock = at;
        let day = at.weekday();
        let due: Vec<(u8, f64)> = inner
            .state
            .config
            .schedules_on(day)
            .filter(|(_, s)| s.hour == at.hour() && s.minute == at.minute())
            .map(|(pump, s)| (pump, s.dose_ml))
            .collect();
        for (pump, dose) in &due {
            inner.state.dispense(*pump, *dose, SCHEDULED_ORIGIN);
        }
        due.len()
    }
}

/// Simulated doser reachable through the [`Link`] trait.
pub struct SimulatedDevice {
    profile: LinkProfile,
    inner: Rc<RefCell<Inner>>,
}

impl SimulatedDevice {
    pub fn new(profile: LinkProfile, state: SimState) -> Self {
        Self {
            profile,
            inner: Rc::new(RefCell::new(Inner {
                state,
                connected: false,
                subscriptions: HashMap::new(),
                journal: Vec::new(),
                outbox: VecDeque::new(),
                upload: FrameDecoder::new(CONFIG_DOC_SIZE),
                delivered: 0,
            })),
        }
    }

    pub fn handle(&self) -> SimHandle {
        SimHandle {
            inner: Rc::clone(&self.inner),
        }
    }

    fn handle_for(&self, characteristic: Uuid) -> Option<CharacteristicHandle> {
        let p = &self.profile;
        if characteristic == p.time {
            Some(TIME_HANDLE)
        } else if characteristic == p.config {
            Some(CONFIG_HANDLE)
        } else if characteristic == p.dose_test {
            Some(TEST_HANDLE)
        } else {
            None
        }
    }
}

impl Link for SimulatedDevice {
    fn connect(&mut self, device_id: &str) -> Result<PeerInfo, BoxError> {
        let mut inner = self.inner.borrow_mut();
        if inner.state.behaviour.fail_connect {
            return Err(Box::new(LinkFault::DeviceNotFound(device_id.to_string())));
        }
        inner.connected = true;
        inner.delivered = 0;
        inner.upload.reset();
        tracing::debug!(device_id, "simulated peer connected");
        Ok(PeerInfo {
            id: device_id.to_string(),
            name: Some(inner.state.name.clone()),
        })
    }

    fn disconnect(&mut self) -> Result<(), BoxError> {
        let mut inner = self.inner.borrow_mut();
        inner.connected = false;
        inner.outbox.clear();
        inner.upload.reset();
        Ok(())
    }

    fn characteristic(
        &mut self,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<CharacteristicHandle, BoxError> {
        if !self.inner.borrow().connected {
            return Err(Box::new(LinkFault::NotConnected));
        }
        if service != self.profile.service {
            return Err(Box::new(LinkFault::Gatt(format!("service {service} not offered"))));
        }
        self.handle_for(characteristic)
            .ok_or_else(|| Box::new(LinkFault::CharacteristicNotFound(characteristic)) as BoxError)
    }

    fn start_notifications(&mut self, handle: CharacteristicHandle) -> Result<(), BoxError> {
        let mut inner = self.inner.borrow_mut();
        if !inner.connected {
            return Err(Box::new(LinkFault::NotConnected));
        }
        *inner.subscriptions.entry(handle).or_insert(0) += 1;
        Ok(())
    }

    fn write(&mut self, handle: CharacteristicHandle, bytes: &[u8]) -> Result<(), BoxError> {
        let mut inner = self.inner.borrow_mut();
        if !inner.connected {
            return Err(Box::new(LinkFault::NotConnected));
        }
        inner.journal.push((handle, bytes.to_vec()));
        match handle {
            CONFIG_HANDLE => inner.on_config_write(bytes),
            TIME_HANDLE => inner.on_time_write(bytes),
            TEST_HANDLE => inner.on_test_write(bytes)?,
            other => {
                return Err(Box::new(LinkFault::Gatt(format!(
                    "write to unknown handle {other:?}"
                ))));
            }
        }
        Ok(())
    }

    fn poll_event(&mut self) -> Option<LinkEvent> {
        self.inner.borrow_mut().outbox.pop_front()
    }
}
