//! Runtime configuration types for the link core.
//!
//! These are the structs the session and the reconciler consume. They are
//! separate from the TOML-deserialized config in `aqua_config`.

use std::time::Duration;
use uuid::Uuid;

/// Where each logical channel lives on the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkProfile {
    pub service: Uuid,
    /// Time-sync writes and unsolicited status notifications.
    pub time: Uuid,
    /// Chunked configuration transfers in both directions.
    pub config: Uuid,
    /// Dose-test commands.
    pub dose_test: Uuid,
    /// Display name used when the peer does not report one.
    pub fallback_name: String,
}

impl Default for LinkProfile {
    fn default() -> Self {
        Self {
            service: aqua_config::DEFAULT_SERVICE_UUID,
            time: aqua_config::DEFAULT_TIME_UUID,
            config: aqua_config::DEFAULT_CONFIG_UUID,
            dose_test: aqua_config::DEFAULT_TEST_UUID,
            fallback_name: "AquaBalancePro".to_string(),
        }
    }
}

/// Chunked transfer parameters.
#[derive(Debug, Clone)]
pub struct TransferCfg {
    /// Bytes per data frame; bounded by the link's per-write payload ceiling.
    pub chunk_size: usize,
    /// Pause after each uploaded data frame.
    pub inter_frame_delay: Duration,
    /// Inbound reassembly ceiling.
    pub max_document_bytes: usize,
}

impl Default for TransferCfg {
    fn default() -> Self {
        Self {
            chunk_size: 20,
            inter_frame_delay: Duration::from_millis(15),
            max_document_bytes: 8192,
        }
    }
}

/// Request/response timing.
#[derive(Debug, Clone)]
pub struct FetchCfg {
    pub timeout: Duration,
    /// Sleep between polls in `fetch_config_blocking`.
    pub poll_interval: Duration,
}

impl Default for FetchCfg {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(6000),
            poll_interval: Duration::from_millis(5),
        }
    }
}

/// Matching tolerances for the timeline reconciler.
#[derive(Debug, Clone)]
pub struct TimelineCfg {
    /// Inclusive clock distance, in minutes, for a schedule/log match.
    pub match_window_min: u32,
    /// Inclusive dose distance, in ml, for a schedule/log match.
    pub dose_tolerance_ml: f64,
    /// Lowercased origins that mark manual test doses.
    pub manual_origins: Vec<String>,
}

impl Default for TimelineCfg {
    fn default() -> Self {
        (&aqua_config::TimelineCfg::default()).into()
    }
}

impl TimelineCfg {
    /// Whether a log origin names a manual test dose.
    pub fn is_manual(&self, origin: &str) -> bool {
        let origin = origin.trim().to_lowercase();
        self.manual_origins.iter().any(|m| *m == origin)
    }
}
