//! `From` implementations bridging `aqua_config` types to `aqua_core` types.

use crate::config::{FetchCfg, LinkProfile, TimelineCfg, TransferCfg};
use std::time::Duration;

// ── LinkProfile ──────────────────────────────────────────────────────────────

impl From<&aqua_config::LinkCfg> for LinkProfile {
    fn from(c: &aqua_config::LinkCfg) -> Self {
        Self {
            service: c.service_uuid,
            time: c.time_uuid,
            config: c.config_uuid,
            dose_test: c.test_uuid,
            fallback_name: c.device_name.clone(),
        }
    }
}

// ── TransferCfg ──────────────────────────────────────────────────────────────

impl From<&aqua_config::TransferCfg> for TransferCfg {
    fn from(c: &aqua_config::TransferCfg) -> Self {
        Self {
            chunk_size: c.chunk_size,
            inter_frame_delay: Duration::from_millis(c.inter_frame_delay_ms),
            max_document_bytes: c.max_document_bytes,
        }
    }
}

// ── FetchCfg ─────────────────────────────────────────────────────────────────

impl From<&aqua_config::FetchCfg> for FetchCfg {
    fn from(c: &aqua_config::FetchCfg) -> Self {
        Self {
            timeout: Duration::from_millis(c.timeout_ms),
            poll_interval: Duration::from_millis(c.poll_interval_ms),
        }
    }
}

// ── TimelineCfg ──────────────────────────────────────────────────────────────

impl From<&aqua_config::TimelineCfg> for TimelineCfg {
    fn from(c: &aqua_config::TimelineCfg) -> Self {
        Self {
            match_window_min: c.match_window_min,
            dose_tolerance_ml: c.dose_tolerance_ml,
            manual_origins: c
                .manual_origins
                .iter()
                .map(|o| o.trim().to_lowercase())
                .collect(),
        }
    }
}
