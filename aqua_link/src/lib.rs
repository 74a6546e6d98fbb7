#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Link adapters for the doser core.
//!
//! Ships a simulated AquaBalancePro peer that speaks the same GATT protocol
//! as the firmware: chunked config transfer, clock sync, dose tests and
//! unsolicited status.

pub mod atomic;
pub mod error;
pub mod sim;
pub mod state;

pub use atomic::write_atomic;
pub use sim::{CONFIG_HANDLE, SimHandle, SimulatedDevice, TEST_HANDLE, TIME_HANDLE};
pub use state::{DeviceState, SimBehaviour, SimState};
