//! Pump calibration from a measured reference dose.

use crate::error::{DoserError, Result};

/// Origin label stamped on calibration test doses.
pub const CALIBRATION_ORIGIN: &str = "Calibracao";

/// New coefficient after dispensing `expected_ml` and measuring `measured_ml`.
///
/// `current * expected / measured`, rounded to three decimals.
pub fn recalibrate(current_coef: f64, expected_ml: f64, measured_ml: f64) -> Result<f64> {
    if !measured_ml.is_finite() || measured_ml <= 0.0 {
        return Err(DoserError::InvalidCommand(format!(
            "measured volume must be > 0 ml (got {measured_ml})"
        )));
    }
    if !expected_ml.is_finite() || expected_ml <= 0.0 {
        return Err(DoserError::InvalidCommand(format!(
            "reference volume must be > 0 ml (got {expected_ml})"
        )));
    }
    if !current_coef.is_finite() || current_coef <= 0.0 {
        return Err(DoserError::InvalidCommand(format!(
            "current coefficient must be > 0 (got {current_coef})"
        )));
    }
    let coef = round3(current_coef * expected_ml / measured_ml);
    if coef <= 0.0 {
        return Err(DoserError::InvalidCommand(
            "coefficient rounds to zero; measured volume is implausible".into(),
        ));
    }
    Ok(coef)
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}
