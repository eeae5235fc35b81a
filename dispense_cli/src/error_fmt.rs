//! Human-readable error descriptions and structured JSON error formatting.

use crate::cli::LAST_POLICY;
use crate::dispense::fault_name;
use dispense_core::error::{BuildError, CommandError, FaultCause};
use serde_json::json;

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun. See README for a sample."
            ),
        };
    }

    if let Some(ce) = err.downcast_ref::<CommandError>() {
        return match ce {
            CommandError::InvalidPump(pump) => format!(
                "What happened: Pump {pump} does not exist on this station.\nLikely causes: Wrong --pump value, or station.pumps set lower than expected in the config.\nHow to fix: Pass --pump between 1 and the configured pump count, or raise station.pumps."
            ),
            CommandError::InvalidTarget => {
                "What happened: Target volume is not usable.\nLikely causes: Zero, negative, or non-finite --liters value.\nHow to fix: Ask for a positive number of liters (e.g., `dispense run --liters 0.5`).".to_string()
            }
            CommandError::AlreadyActive(pump) => format!(
                "What happened: Pump {pump} is already running a session.\nLikely causes: A previous run is still dispensing or paused.\nHow to fix: Stop or finish the active session before starting a new one."
            ),
            CommandError::Faulted(pump) => format!(
                "What happened: Pump {pump} is faulted and refuses new commands.\nLikely causes: An earlier timeout or emergency stop was never cleared.\nHow to fix: Clear the fault, then start a new session."
            ),
        };
    }

    if let Some(cause) = err.downcast_ref::<FaultCause>() {
        return fault_text(cause);
    }

    // String-based heuristics for errors coming from init or config
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("parse config") || lower.contains("toml") {
        return "What happened: The config file could not be parsed.\nLikely causes: TOML syntax errors or wrong value types.\nHow to fix: Fix the file named in the error, or remove it to fall back to defaults.".to_string();
    }

    if lower.contains("station.") || lower.contains("session.") || lower.contains("feed.") {
        return "What happened: Configuration is invalid or incomplete.\nLikely causes: Out-of-range values under [station], [session], or [feed].\nHow to fix: Edit the TOML config and try again.".to_string();
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

/// Human-readable explanation for a session fault, same register as humanize.
pub fn fault_text(cause: &FaultCause) -> String {
    match cause {
        FaultCause::Timeout {
            elapsed_ms,
            limit_ms,
        } => format!(
            "What happened: The session timed out after {elapsed_ms} ms (limit {limit_ms} ms) before reaching the target.\nLikely causes: Stalled feed, a leak, or a timeout too short for the target volume.\nHow to fix: Check the line and the meter, or raise session.timeout_ms (CLI: --timeout-ms)."
        ),
        FaultCause::EmergencyStop => {
            "What happened: Emergency stop forced every pump off.\nLikely causes: The shutdown signal fired (ctrl-c) or an operator hit the stop.\nHow to fix: Check the station, clear the fault, then start a new session.".to_string()
        }
    }
}

/// Stable exit codes for session faults.
pub fn exit_code_for_fault(cause: &FaultCause) -> i32 {
    match cause {
        FaultCause::EmergencyStop => 2,
        FaultCause::Timeout { .. } => 3,
    }
}

/// Map FaultCause (if present) to stable exit codes; other errors return 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if let Some(cause) = err.downcast_ref::<FaultCause>() {
        return exit_code_for_fault(cause);
    }
    1
}

/// Structured JSON for a session fault when --json is enabled.
pub fn format_fault_json(cause: &FaultCause) -> String {
    let msg = fault_text(cause);
    let details = LAST_POLICY.get();

    let detail_obj = match cause {
        FaultCause::Timeout { .. } => details.map(|p| {
            json!({ "timeout_ms": p.timeout_ms, "threshold_l": p.completion_threshold_l, "max_flow_lpm": p.max_flow_lpm })
        }),
        FaultCause::EmergencyStop => None,
    };

    let obj = if let Some(d) = detail_obj {
        json!({ "reason": fault_name(cause), "details": d, "message": msg })
    } else {
        json!({ "reason": fault_name(cause), "message": msg })
    };
    obj.to_string()
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    if let Some(cause) = err.downcast_ref::<FaultCause>() {
        return format_fault_json(cause);
    }

    // Generic error JSON
    json!({ "reason": "Error", "message": humanize(err) }).to_string()
}
