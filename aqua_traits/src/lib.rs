//! Seams between the link core and the outside world.
//!
//! `Clock` abstracts time so timeouts can be driven deterministically, `Link`
//! abstracts a GATT-style byte link (write + notify per characteristic).
pub mod clock;

pub use clock::{Clock, MonotonicClock};
#[cfg(any(test, feature = "test-util"))]
pub use clock::manual::ManualClock;

use uuid::Uuid;

/// Boxed error returned across the `Link` boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Opaque handle for one resolved characteristic. Only valid for the
/// connection that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CharacteristicHandle(pub u16);

/// Identity reported by the peer on a successful connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    pub id: String,
    pub name: Option<String>,
}

/// Something the link produced without being asked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// A characteristic the session subscribed to changed value.
    Notification {
        handle: CharacteristicHandle,
        bytes: Vec<u8>,
    },
    /// The underlying link went away (peer out of range, powered off, ...).
    Disconnected,
}

/// Typed faults adapters should box and return so the core can map them precisely.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum LinkFault {
    #[error("link not connected")]
    NotConnected,
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("characteristic not found: {0}")]
    CharacteristicNotFound(Uuid),
    #[error("gatt operation failed: {0}")]
    Gatt(String),
    #[error("link operation timed out")]
    Timeout,
}

/// A byte-oriented notify/write link with small per-write payloads.
///
/// Implementations queue inbound traffic and hand it out through
/// `poll_event`; they never call back into the session themselves.
pub trait Link {
    fn connect(&mut self, device_id: &str) -> Result<PeerInfo, BoxError>;
    fn disconnect(&mut self) -> Result<(), BoxError>;
    fn characteristic(
        &mut self,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<CharacteristicHandle, BoxError>;
    fn start_notifications(&mut self, handle: CharacteristicHandle) -> Result<(), BoxError>;
    fn write(&mut self, handle: CharacteristicHandle, bytes: &[u8]) -> Result<(), BoxError>;
    fn poll_event(&mut self) -> Option<LinkEvent>;
}
