//! Unsolicited status notifications.
//!
//! Decoding is fail-soft: a garbled notification is logged and the last good
//! snapshot stays in place.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DoserError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    /// Device clock as reported, e.g. `"14/10/2026 08:30:00"`.
    pub time: Option<String>,
    pub wifi_connected: bool,
    pub wifi_rssi: Option<i32>,
    pub wifi_ip: Option<String>,
    pub ap_ssid: Option<String>,
    pub ap_ip: Option<String>,
    /// Cloud backend ("firebase") readiness.
    pub backend_ready: bool,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawWifi {
    connected: Option<bool>,
    rssi: Option<i32>,
    ip: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawAp {
    ssid: Option<String>,
    ip: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawBackend {
    ready: Option<bool>,
}

#[derive(Deserialize)]
struct RawStatus {
    #[serde(default)]
    time: Option<String>,
    #[serde(default)]
    wifi: Option<RawWifi>,
    #[serde(default)]
    ap: Option<RawAp>,
    #[serde(default)]
    firebase: Option<RawBackend>,
}

impl From<RawStatus> for StatusSnapshot {
    fn from(raw: RawStatus) -> Self {
        let wifi = raw.wifi.unwrap_or_default();
        let ap = raw.ap.unwrap_or_default();
        Self {
            time: raw.time,
            wifi_connected: wifi.connected.unwrap_or(false),
            wifi_rssi: wifi.rssi,
            wifi_ip: wifi.ip,
            ap_ssid: ap.ssid,
            ap_ip: ap.ip,
            backend_ready: raw.firebase.and_then(|f| f.ready).unwrap_or(false),
        }
    }
}

/// Parse a status notification.
pub fn try_decode(bytes: &[u8]) -> Result<StatusSnapshot, DoserError> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| DoserError::StatusDecode(e.to_string()))?;
    if !value.is_object() {
        return Err(DoserError::StatusDecode("status is not a JSON object".into()));
    }
    RawStatus::deserialize(value)
        .map(StatusSnapshot::from)
        .map_err(|e| DoserError::StatusDecode(e.to_string()))
}

/// Parse a status notification; `None` on any malformed input.
pub fn decode(bytes: &[u8]) -> Option<StatusSnapshot> {
    try_decode(bytes).ok()
}

/// Latest known status and when it arrived.
#[derive(Debug, Default)]
pub struct StatusTracker {
    latest: Option<(StatusSnapshot, Instant)>,
}

impl StatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a notification. On failure the previous snapshot is kept and `None` returned.
    pub fn apply(&mut self, bytes: &[u8], now: Instant) -> Option<&StatusSnapshot> {
        match try_decode(bytes) {
            Ok(snap) => {
                self.latest = Some((snap, now));
                self.latest.as_ref().map(|(s, _)| s)
            }
            Err(e) => {
                tracing::warn!(error = %e, len = bytes.len(), "status notification dropped");
                None
            }
        }
    }

    pub fn snapshot(&self) -> Option<&StatusSnapshot> {
        self.latest.as_ref().map(|(s, _)| s)
    }

    pub fn received_at(&self) -> Option<Instant> {
        self.latest.as_ref().map(|(_, t)| *t)
    }

    pub fn clear(&mut self) {
        self.latest = None;
    }
}
