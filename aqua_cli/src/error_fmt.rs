//! Human-readable error descriptions and structured JSON error formatting.

use aqua_core::error::{BuildError, DoserError};

/// Stable name of a taxonomy variant, used as the JSON `reason`.
pub fn reason_name(err: &DoserError) -> &'static str {
    match err {
        DoserError::LinkUnavailable => "LinkUnavailable",
        DoserError::RequestTimeout => "RequestTimeout",
        DoserError::RequestInFlight => "RequestInFlight",
        DoserError::Format(_) => "Format",
        DoserError::StatusDecode(_) => "StatusDecode",
        DoserError::Link(_) => "Link",
        DoserError::InvalidCommand(_) => "InvalidCommand",
        DoserError::Config(_) => "Config",
    }
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingLink => {
                "What happened: No link was provided to the session.\nLikely causes: The device adapter failed to initialize.\nHow to fix: Check the [link] section and the device state file, then rerun.".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Out-of-range values in the [transfer] or [fetch] sections, or duplicated channel uuids.\nHow to fix: Edit the config file, then rerun. See etc/aqua_config.toml for a sample."
            ),
        };
    }

    if let Some(de) = err.downcast_ref::<DoserError>() {
        return match de {
            DoserError::LinkUnavailable => "What happened: The link to the doser is not available.\nLikely causes: Device out of range, powered off, or the connection dropped mid-transfer.\nHow to fix: Move closer to the doser, power-cycle it, and rerun.".to_string(),
            DoserError::RequestTimeout => "What happened: The doser did not answer in time.\nLikely causes: Firmware busy, notifications not delivered, or fetch.timeout_ms too low.\nHow to fix: Rerun; if it keeps failing raise fetch.timeout_ms in the config.".to_string(),
            DoserError::RequestInFlight => "What happened: A configuration transfer is already running.\nLikely causes: A previous fetch has not finished or timed out yet.\nHow to fix: Wait for the running transfer to finish, then retry.".to_string(),
            DoserError::Format(msg) => format!(
                "What happened: The device sent data that could not be understood ({msg}).\nLikely causes: Transfer interrupted, frames lost, or a document larger than transfer.max_document_bytes.\nHow to fix: Rerun the command; check the firmware version if it persists."
            ),
            DoserError::InvalidCommand(msg) => format!(
                "What happened: The command was rejected ({msg}).\nLikely causes: Pump number outside 1..=3, non-positive volume, or an invalid schedule.\nHow to fix: Correct the arguments or the configuration document and rerun."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    // String-based heuristics for errors coming from init or config
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("invalid configuration") || lower.contains("must be") {
        return format!(
            "What happened: Configuration is invalid ({msg}).\nLikely causes: Out-of-range values or a typo in the TOML.\nHow to fix: Edit the TOML config and try again."
        );
    }

    if lower.contains("device state") {
        return format!(
            "What happened: The device state file could not be used ({msg}).\nLikely causes: The file was edited by hand or is not JSON.\nHow to fix: Fix or delete the file; a fresh one is created on the next write."
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Map taxonomy variants to stable exit codes; everything else returns 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match err.downcast_ref::<DoserError>() {
        Some(DoserError::LinkUnavailable) => 2,
        Some(DoserError::RequestTimeout) => 3,
        Some(DoserError::RequestInFlight) => 4,
        Some(DoserError::Format(_)) => 5,
        Some(DoserError::InvalidCommand(_)) => 6,
        _ => 1,
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    if let Some(de) = err.downcast_ref::<DoserError>() {
        return json!({
            "reason": reason_name(de),
            "exit_code": exit_code_for_error(err),
            "message": humanize(err),
        })
        .to_string();
    }

    // Generic error JSON
    json!({ "reason": "Error", "exit_code": 1, "message": humanize(err) }).to_string()
}
