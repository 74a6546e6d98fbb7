//! Builder for [`Session`].
//!
//! The link is the only required part; everything else falls back to the
//! device defaults. Validation happens once, in `build()`.

use std::sync::Arc;

use aqua_traits::{Clock, Link, MonotonicClock};

use crate::codec::{FrameDecoder, FrameEncoder};
use crate::config::{FetchCfg, LinkProfile, TransferCfg};
use crate::error::BuildError;
use crate::session::Session;

pub struct SessionBuilder<L> {
    link: Option<L>,
    clock: Option<Box<dyn Clock + Send + Sync>>,
    profile: Option<LinkProfile>,
    transfer: Option<TransferCfg>,
    fetch: Option<FetchCfg>,
}

impl<L> Default for SessionBuilder<L> {
    fn default() -> Self {
        Self {
            link: None,
            clock: None,
            profile: None,
            transfer: None,
            fetch: None,
        }
    }
}

impl<L: Link> SessionBuilder<L> {
    pub fn with_link(mut self, link: L) -> Self {
        self.link = Some(link);
        self
    }

    /// Inject a clock (tests use `ManualClock`).
    pub fn with_clock(mut self, clock: Box<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_profile(mut self, profile: LinkProfile) -> Self {
        self.profile = Some(profile);
        self
    }

    pub fn with_transfer(mut self, transfer: TransferCfg) -> Self {
        self.transfer = Some(transfer);
        self
    }

    pub fn with_fetch(mut self, fetch: FetchCfg) -> Self {
        self.fetch = Some(fetch);
        self
    }

    pub fn build(self) -> eyre::Result<Session<L>> {
        let link = self
            .link
            .ok_or_else(|| eyre::Report::new(BuildError::MissingLink))?;
        let profile = self.profile.unwrap_or_default();
        let transfer = self.transfer.unwrap_or_default();
        let fetch = self.fetch.unwrap_or_default();

        // ── Validation ───────────────────────────────────────────────────────
        if transfer.chunk_size == 0 {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "chunk_size must be >= 1",
            )));
        }
        if transfer.max_document_bytes < transfer.chunk_size {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "max_document_bytes must be >= chunk_size",
            )));
        }
        if fetch.timeout.is_zero() {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "fetch timeout must be > 0",
            )));
        }
        if fetch.poll_interval.is_zero() {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "poll interval must be > 0",
            )));
        }
        let channels = [profile.time, profile.config, profile.dose_test];
        if channels[0] == channels[1] || channels[1] == channels[2] || channels[0] == channels[2] {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "channel uuids must be distinct",
            )));
        }

        let clock: Arc<dyn Clock + Send + Sync> = match self.clock {
            Some(b) => Arc::from(b),
            None => Arc::new(MonotonicClock::new()),
        };
        let encoder = FrameEncoder::new(transfer.chunk_size).map_err(eyre::Report::new)?;
        let decoder = FrameDecoder::new(transfer.max_document_bytes);

        Ok(Session::from_parts(
            link, clock, profile, transfer, fetch, encoder, decoder,
        ))
    }
}
