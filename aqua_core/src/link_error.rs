//! Maps `Box<dyn Error>` from the `Link` boundary to typed `DoserError`.
//!
//! The `Link` trait returns boxed errors so adapters stay free to use their
//! own types; adapters that box `aqua_traits::LinkFault` get a precise mapping.

use crate::error::DoserError;
use aqua_traits::LinkFault;

/// Map a link-boundary error to a typed `DoserError`.
///
/// Attempts to downcast `LinkFault` first, then falls back to string-based
/// heuristics.
pub fn map_link_fault(e: &(dyn std::error::Error + 'static)) -> DoserError {
    if let Some(fault) = e.downcast_ref::<LinkFault>() {
        return match fault {
            LinkFault::NotConnected => DoserError::LinkUnavailable,
            LinkFault::Timeout => DoserError::RequestTimeout,
            other => DoserError::Link(other.to_string()),
        };
    }

    // Fallback: string-based detection
    let s = e.to_string();
    let lower = s.to_lowercase();
    if lower.contains("not connected") || lower.contains("disconnected") {
        DoserError::LinkUnavailable
    } else if lower.contains("timeout") || lower.contains("timed out") {
        DoserError::RequestTimeout
    } else {
        DoserError::Link(s)
    }
}
