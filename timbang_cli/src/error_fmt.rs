//! Human-readable error descriptions and structured JSON error formatting.

/// Map an eyre::Report to a human-readable explanation with likely causes
/// and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    use timbang_core::error::{AcquireError, BuildError, CommitError};

    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun. See etc/timbang.toml for a sample."
            ),
        };
    }

    if let Some(ce) = err.downcast_ref::<CommitError>() {
        return match ce {
            CommitError::InvalidMeasurement(msg) => format!(
                "What happened: The captured values were rejected ({msg}).\nLikely causes: The subject left the scale before capture, or the sensor glitched.\nHow to fix: Reconnect, wait for a stable reading and capture again."
            ),
            CommitError::SubjectNotFound(id) => format!(
                "What happened: Subject {id} is not in the roster or is inactive.\nLikely causes: Wrong --subject id, or the subject was deactivated.\nHow to fix: Check the roster (run `timbang init` to seed a demo roster)."
            ),
            CommitError::OperatorNotFound(id) => format!(
                "What happened: Operator {id} is not registered or is inactive.\nLikely causes: Wrong --operator id.\nHow to fix: Check the operator roster."
            ),
            CommitError::Storage(msg) => format!(
                "What happened: The database rejected the record ({msg}).\nLikely causes: Disk full, locked database file, or a corrupt store.\nHow to fix: Check the --db path and free space, then retry; the capture was not lost silently."
            ),
        };
    }

    if let Some(ae) = err.downcast_ref::<AcquireError>() {
        return match ae {
            AcquireError::ConnectionLost => "What happened: The device connection was lost before the capture was confirmed.\nLikely causes: Operator interrupt, sensor unplugged, or the stream stalled.\nHow to fix: Reconnect and measure again; nothing was persisted.".to_string(),
            AcquireError::NotStable => "What happened: Capture was attempted before the stream settled.\nLikely causes: The subject is still moving.\nHow to fix: Wait for the stable indicator, then capture.".to_string(),
            AcquireError::NotConnected => "What happened: Capture was attempted without a streaming device.\nLikely causes: Connect was never called or the link dropped.\nHow to fix: Connect the sensor and wait for streaming.".to_string(),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    // String-based heuristics for errors coming from init or config
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("reference csv must have headers") {
        return "Invalid headers in growth reference CSV. Expected 'age_min_months,age_max_months,weight_min_kg,weight_max_kg,height_min_cm,height_max_cm'.".to_string();
    }

    if lower.contains("wait bound") {
        return format!(
            "What happened: {msg}.\nLikely causes: The readings never settled within session.max_wait_ms.\nHow to fix: Steady the subject, raise the jitter thresholds, or set session.max_wait_ms = 0 to wait indefinitely."
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

/// Map typed errors to stable exit codes; everything else returns 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    use timbang_core::error::{AcquireError, CommitError};
    if let Some(ce) = err.downcast_ref::<CommitError>() {
        return match ce {
            CommitError::InvalidMeasurement(_) => 2,
            CommitError::SubjectNotFound(_) => 3,
            CommitError::OperatorNotFound(_) => 4,
            CommitError::Storage(_) => 5,
        };
    }
    if let Some(AcquireError::ConnectionLost) = err.downcast_ref::<AcquireError>() {
        return 6;
    }
    1
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;
    use timbang_core::error::{AcquireError, CommitError};

    let reason = if let Some(ce) = err.downcast_ref::<CommitError>() {
        match ce {
            CommitError::InvalidMeasurement(_) => "InvalidMeasurement",
            CommitError::SubjectNotFound(_) => "SubjectNotFound",
            CommitError::OperatorNotFound(_) => "OperatorNotFound",
            CommitError::Storage(_) => "StorageError",
        }
    } else if let Some(ae) = err.downcast_ref::<AcquireError>() {
        match ae {
            AcquireError::ConnectionLost => "ConnectionLost",
            AcquireError::NotConnected => "NotConnected",
            AcquireError::NotStable => "NotStable",
            AcquireError::NoSubjectSelected => "NoSubjectSelected",
            AcquireError::CaptureInProgress => "CaptureInProgress",
            AcquireError::Device(_) => "DeviceError",
            AcquireError::State(_) => "InvalidState",
        }
    } else {
        "Error"
    };

    json!({ "reason": reason, "message": humanize(err) }).to_string()
}
