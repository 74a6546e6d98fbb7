//! Transport session over a [`Link`].
//!
//! The session owns the link, the per-connection characteristic handles, the
//! inbound chunk decoder and the request correlator. It is single-threaded
//! and cooperative: link events are drained by [`Session::pump`] (or fed
//! directly through [`Session::handle_event`]), and request deadlines are
//! checked against the injected clock on every pump.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use aqua_traits::{CharacteristicHandle, Clock, Link, LinkEvent};
use chrono::NaiveDateTime;
use serde_json::json;

use crate::builder::SessionBuilder;
use crate::codec::{CFG_GET, DecodeEvent, Frame, FrameDecoder, FrameEncoder};
use crate::config::{FetchCfg, LinkProfile, TransferCfg};
use crate::correlator::{Correlator, RequestKind, ResponseHandle, Settle};
use crate::device::{DeviceConfig, PUMP_COUNT};
use crate::error::{DoserError, Result};
use crate::link_error::map_link_fault;
use crate::status::{StatusSnapshot, StatusTracker};
use crate::util::format_device_time;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
}

/// The paired peer. Exists only while connecting or connected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceLink {
    pub id: String,
    pub name: String,
    pub state: LinkState,
}

/// Logical channels carried by the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Clock sync writes; unsolicited status notifications.
    Time,
    Config,
    DoseTest,
}

#[derive(Debug, Clone, Copy)]
struct Channels {
    time: CharacteristicHandle,
    config: CharacteristicHandle,
    dose_test: CharacteristicHandle,
}

impl Channels {
    const fn handle(&self, channel: Channel) -> CharacteristicHandle {
        match channel {
            Channel::Time => self.time,
            Channel::Config => self.config,
            Channel::DoseTest => self.dose_test,
        }
    }
}

/// What observers registered with [`Session::subscribe`] are told.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Connectivity(bool),
    Status(StatusSnapshot),
    Config(DeviceConfig),
}

type Listener = Box<dyn FnMut(&SessionEvent)>;

pub struct Session<L: Link> {
    link: L,
    clock: Arc<dyn Clock + Send + Sync>,
    profile: LinkProfile,
    transfer: TransferCfg,
    fetch: FetchCfg,
    encoder: FrameEncoder,
    decoder: FrameDecoder,
    device: Option<DeviceLink>,
    channels: Option<Channels>,
    subscribed: bool,
    requests: Correlator<DeviceConfig>,
    status: StatusTracker,
    last_config: Option<DeviceConfig>,
    listeners: Vec<Listener>,
}

impl<L: Link> std::fmt::Debug for Session<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("device", &self.device)
            .field("subscribed", &self.subscribed)
            .field("decoder", &self.decoder.state())
            .field(
                "fetch_pending",
                &self.requests.is_pending(RequestKind::Config),
            )
            .finish_non_exhaustive()
    }
}

impl<L: Link> Session<L> {
    pub fn builder() -> SessionBuilder<L> {
        SessionBuilder::default()
    }

    pub(crate) fn from_parts(
        link: L,
        clock: Arc<dyn Clock + Send + Sync>,
        profile: LinkProfile,
        transfer: TransferCfg,
        fetch: FetchCfg,
        encoder: FrameEncoder,
        decoder: FrameDecoder,
    ) -> Self {
        Self {
            link,
            clock,
            profile,
            transfer,
            fetch,
            encoder,
            decoder,
            device: None,
            channels: None,
            subscribed: false,
            requests: Correlator::new(),
            status: StatusTracker::new(),
            last_config: None,
            listeners: Vec::new(),
        }
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn state(&self) -> LinkState {
        self.device
            .as_ref()
            .map_or(LinkState::Disconnected, |d| d.state)
    }

    pub fn is_connected(&self) -> bool {
        self.state() == LinkState::Connected
    }

    pub const fn device(&self) -> Option<&DeviceLink> {
        self.device.as_ref()
    }

    /// Latest status snapshot; cleared on link loss.
    pub fn status(&self) -> Option<&StatusSnapshot> {
        self.status.snapshot()
    }

    /// Last configuration fetched or pushed on this session.
    pub const fn last_config(&self) -> Option<&DeviceConfig> {
        self.last_config.as_ref()
    }

    pub fn is_fetch_pending(&self) -> bool {
        self.requests.is_pending(RequestKind::Config)
    }

    pub const fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    /// Pair with `device_id` and prepare the channels. A no-op when already connected.
    pub fn connect(&mut self, device_id: &str) -> Result<()> {
        if self.is_connected() {
            tracing::debug!(device_id, "connect while connected; nothing to do");
            return Ok(());
        }
        self.device = Some(DeviceLink {
            id: device_id.to_string(),
            name: self.profile.fallback_name.clone(),
            state: LinkState::Connecting,
        });
        tracing::info!(device_id, "connecting");

        if let Err(e) = self.open_channels(device_id) {
            tracing::warn!(device_id, error = %e, "connect failed");
            self.device = None;
            self.channels = None;
            self.subscribed = false;
            if let Err(close) = self.link.disconnect() {
                tracing::debug!(error = %close, "link close after failed connect");
            }
            return Err(e);
        }

        if let Some(d) = self.device.as_mut() {
            d.state = LinkState::Connected;
            tracing::info!(device_id, name = %d.name, "connected");
        }
        self.emit(&SessionEvent::Connectivity(true));
        Ok(())
    }

    fn open_channels(&mut self, device_id: &str) -> Result<()> {
        let peer = self
            .link
            .connect(device_id)
            .map_err(|e| map_link_fault(e.as_ref()))?;
        if let (Some(d), Some(name)) = (self.device.as_mut(), peer.name) {
            d.name = name;
        }

        let service = self.profile.service;
        let mut resolve = |uuid| {
            self.link
                .characteristic(service, uuid)
                .map_err(|e| map_link_fault(e.as_ref()))
        };
        let channels = Channels {
            time: resolve(self.profile.time)?,
            config: resolve(self.profile.config)?,
            dose_test: resolve(self.profile.dose_test)?,
        };

        if !self.subscribed {
            for handle in [channels.config, channels.time] {
                self.link
                    .start_notifications(handle)
                    .map_err(|e| map_link_fault(e.as_ref()))?;
            }
            self.subscribed = true;
        }
        self.channels = Some(channels);
        Ok(())
    }

    /// User-initiated disconnect. Pending requests fail with `LinkUnavailable`.
    pub fn disconnect(&mut self) -> Result<()> {
        if self.device.is_none() {
            return Ok(());
        }
        let closed = self
            .link
            .disconnect()
            .map_err(|e| map_link_fault(e.as_ref()));
        tracing::info!("disconnected by caller");
        self.teardown();
        closed
    }

    fn teardown(&mut self) {
        let was_linked = self.device.take().is_some();
        self.channels = None;
        self.subscribed = false;
        self.decoder.reset();
        self.status.clear();
        let rejected = self.requests.reject_all(&DoserError::LinkUnavailable);
        if rejected > 0 {
            tracing::warn!(rejected, "pending requests rejected on link loss");
        }
        if was_linked {
            self.emit(&SessionEvent::Connectivity(false));
        }
    }

    // ── Events ───────────────────────────────────────────────────────────────

    /// Register an observer for connectivity, status and configuration updates.
    pub fn subscribe<F>(&mut self, listener: F)
    where
        F: FnMut(&SessionEvent) + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    fn emit(&mut self, event: &SessionEvent) {
        for listener in &mut self.listeners {
            listener(event);
        }
    }

    /// Drain queued link events, then expire overdue requests.
    ///
    /// Returns the number of link events handled.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.link.poll_event() {
            self.handle_event(event);
            handled += 1;
        }
        self.expire_overdue();
        handled
    }

    /// Entry point for one link event.
    pub fn handle_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Disconnected => {
                if self.device.is_some() {
                    tracing::warn!("link lost");
                    self.teardown();
                }
            }
            LinkEvent::Notification { handle, bytes } => {
                // A deadline that passed before this frame arrived wins.
                self.expire_overdue();
                let Some(channels) = self.channels else {
                    tracing::trace!(?handle, "notification while disconnected ignored");
                    return;
                };
                if handle == channels.config {
                    self.on_config_frame(&bytes);
                } else if handle == channels.time {
                    self.on_status(&bytes);
                } else {
                    tracing::debug!(?handle, "notification on unexpected characteristic");
                }
            }
        }
    }

    fn expire_overdue(&mut self) {
        let expired = self.requests.expire(self.clock.now());
        if expired.contains(&RequestKind::Config) {
            // A late CFG_END must not complete a stale transfer.
            self.decoder.reset();
        }
    }

    fn on_config_frame(&mut self, bytes: &[u8]) {
        match self.decoder.push(bytes) {
            DecodeEvent::Pending | DecodeEvent::Ignored => {}
            DecodeEvent::Document(doc) => {
                if !self.requests.is_pending(RequestKind::Config) {
                    tracing::warn!("configuration document with no pending fetch dropped");
                    return;
                }
                let outcome = DeviceConfig::from_document(&doc);
                if let Ok(cfg) = &outcome {
                    self.last_config = Some(cfg.clone());
                    self.emit(&SessionEvent::Config(cfg.clone()));
                }
                self.requests.settle(RequestKind::Config, outcome);
            }
            DecodeEvent::Malformed(e) => {
                if self.requests.settle(RequestKind::Config, Err(e.clone())) == Settle::NoPending {
                    tracing::warn!(error = %e, "malformed transfer with no pending fetch");
                }
            }
        }
    }

    fn on_status(&mut self, bytes: &[u8]) {
        let now = self.clock.now();
        if let Some(snap) = self.status.apply(bytes, now).cloned() {
            self.emit(&SessionEvent::Status(snap));
        }
    }

    // ── Writes ───────────────────────────────────────────────────────────────

    fn channels(&self) -> Result<Channels> {
        match (self.state(), self.channels) {
            (LinkState::Connected, Some(c)) => Ok(c),
            _ => Err(DoserError::LinkUnavailable),
        }
    }

    /// Write raw bytes to one logical channel.
    pub fn write(&mut self, channel: Channel, bytes: &[u8]) -> Result<()> {
        let handle = self.channels()?.handle(channel);
        self.write_handle(handle, bytes)
    }

    fn write_handle(&mut self, handle: CharacteristicHandle, bytes: &[u8]) -> Result<()> {
        self.link
            .write(handle, bytes)
            .map_err(|e| map_link_fault(e.as_ref()))
    }

    // ── Requests ─────────────────────────────────────────────────────────────

    /// Send `CFG_GET` and return a handle that settles on `CFG_END`, timeout or link loss.
    pub fn fetch_config(&mut self) -> Result<ResponseHandle<DeviceConfig>> {
        let channels = self.channels()?;
        let deadline = self.clock.deadline(self.fetch.timeout);
        let handle = self.requests.begin(RequestKind::Config, deadline)?;
        self.decoder.reset();
        if let Err(e) = self.write_handle(channels.config, CFG_GET) {
            self.requests.cancel(RequestKind::Config);
            return Err(e);
        }
        tracing::debug!(timeout = ?self.fetch.timeout, "config fetch armed");
        Ok(handle)
    }

    /// Fetch and wait, pumping the link and sleeping `poll_interval` on the clock.
    ///
    /// Setting `cancel` disconnects, which settles the fetch with `LinkUnavailable`.
    pub fn fetch_config_blocking(&mut self, cancel: Option<&AtomicBool>) -> Result<DeviceConfig> {
        let mut handle = self.fetch_config()?;
        loop {
            self.pump();
            if let Some(outcome) = handle.try_take() {
                return outcome;
            }
            if cancel.is_some_and(|c| c.load(Ordering::SeqCst)) {
                tracing::info!("config fetch cancelled");
                if let Err(e) = self.disconnect() {
                    tracing::debug!(error = %e, "disconnect on cancel");
                }
                return handle.try_take().unwrap_or(Err(DoserError::LinkUnavailable));
            }
            if !self.requests.is_pending(RequestKind::Config) {
                return Err(DoserError::LinkUnavailable);
            }
            self.clock.sleep(self.fetch.poll_interval);
        }
    }

    /// Wait for a status notification, pumping the link on the injected clock.
    ///
    /// Fails with `RequestTimeout` once the fetch timeout elapses without one.
    pub fn wait_for_status(&mut self, cancel: Option<&AtomicBool>) -> Result<StatusSnapshot> {
        let deadline = self.clock.deadline(self.fetch.timeout);
        loop {
            self.pump();
            if let Some(s) = self.status.snapshot() {
                return Ok(s.clone());
            }
            if !self.is_connected() {
                return Err(DoserError::LinkUnavailable);
            }
            if cancel.is_some_and(|c| c.load(Ordering::SeqCst)) {
                tracing::info!("status wait cancelled");
                return Err(DoserError::RequestTimeout);
            }
            if self.clock.now() >= deadline {
                tracing::warn!(timeout = ?self.fetch.timeout, "no status notification");
                return Err(DoserError::RequestTimeout);
            }
            self.clock.sleep(self.fetch.poll_interval);
        }
    }

    /// Validate and upload a configuration in chunks.
    pub fn push_config(&mut self, config: &DeviceConfig) -> Result<()> {
        config.validate()?;
        let channels = self.channels()?;
        if self.requests.is_pending(RequestKind::Config) {
            return Err(DoserError::RequestInFlight);
        }
        let frames = self.encoder.encode(&config.to_document())?;
        for frame in &frames {
            self.write_handle(channels.config, frame.as_bytes())?;
            if matches!(frame, Frame::Data(_)) {
                self.clock.sleep(self.transfer.inter_frame_delay);
            }
        }
        tracing::info!(frames = frames.len(), "configuration uploaded");
        self.last_config = Some(config.clone());
        Ok(())
    }

    /// Set the device clock.
    pub fn sync_time(&mut self, at: NaiveDateTime) -> Result<()> {
        let text = format_device_time(at);
        self.write(Channel::Time, text.as_bytes())?;
        tracing::info!(time = %text, "device clock synced");
        Ok(())
    }

    /// Ask the device to dispense `ml` on `pump_id` right now.
    pub fn test_dose(&mut self, pump_id: u8, ml: f64) -> Result<()> {
        self.test_dose_with_origin(pump_id, ml, None)
    }

    /// As [`Session::test_dose`], labelling the resulting log entry with `origin`.
    pub fn test_dose_with_origin(
        &mut self,
        pump_id: u8,
        ml: f64,
        origin: Option<&str>,
    ) -> Result<()> {
        if !(1..=PUMP_COUNT).contains(&pump_id) {
            return Err(DoserError::InvalidCommand(format!(
                "pump must be 1..={PUMP_COUNT} (got {pump_id})"
            )));
        }
        if !ml.is_finite() || ml <= 0.0 {
            return Err(DoserError::InvalidCommand(format!(
                "dose must be > 0 ml (got {ml})"
            )));
        }
        let mut cmd = json!({ "bomb": pump_id, "dosagem": ml });
        if let Some(origin) = origin {
            cmd["origem"] = json!(origin);
        }
        let payload = serde_json::to_vec(&cmd).map_err(|e| DoserError::Format(e.to_string()))?;
        self.write(Channel::DoseTest, &payload)?;
        tracing::info!(pump_id, ml, "test dose sent");
        Ok(())
    }
}
