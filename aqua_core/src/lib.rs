#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Link core for the AquaBalancePro multi-pump doser (hardware-agnostic).
//!
//! All radio interaction goes through the `aqua_traits::Link` trait.
//!
//! ## Architecture
//!
//! - **Framing**: sentinel-delimited chunking of JSON documents (`codec`)
//! - **Session**: connect lifecycle, channel writes, notification dispatch (`session`)
//! - **Correlation**: single-flight config fetch with deadline (`correlator`)
//! - **Status**: fail-soft decoding of unsolicited status (`status`)
//! - **Timeline**: reconciliation of schedules against the dose log (`timeline`)

pub mod builder;
pub mod calibration;
pub mod codec;
pub mod config;
pub mod conversions;
pub mod correlator;
pub mod device;
pub mod error;
pub mod link_error;
pub mod logs;
pub mod mocks;
pub mod session;
pub mod status;
pub mod timeline;
pub mod util;

pub use builder::SessionBuilder;
pub use codec::{DecodeEvent, Frame, FrameDecoder, FrameEncoder, decode_frames};
pub use config::{FetchCfg, LinkProfile, TimelineCfg, TransferCfg};
pub use correlator::{Correlator, RequestKind, ResponseHandle};
pub use device::{BombConfig, DeviceConfig, Schedule, WeekdayMask};
pub use error::{BuildError, DoserError, Result};
pub use logs::{LogEntry, parse_dose_log, sort_newest_first};
pub use session::{Channel, DeviceLink, LinkState, Session, SessionEvent};
pub use status::{StatusSnapshot, StatusTracker};
pub use timeline::{TimelineEvent, reconcile};
