//! Formatted output helpers for CLI commands.

use chrono::{DateTime, Utc};
use nspawn_common::types::ExitResult;

/// Formats a byte count into a human-readable string (e.g., "128 MiB").
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = KIB * 1024;
    const GIB: u64 = MIB * 1024;

    if bytes == u64::MAX {
        "unlimited".to_string()
    } else if bytes >= GIB {
        format!("{:.1} GiB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{bytes} B")
    }
}

/// Formats a realtime bus timestamp in microseconds since the epoch.
///
/// Zero means the timestamp is unset.
#[must_use]
pub fn format_usec(usec: u64) -> String {
    let Ok(micros) = i64::try_from(usec) else {
        return "-".to_string();
    };
    if micros == 0 {
        return "-".to_string();
    }
    DateTime::<Utc>::from_timestamp_micros(micros)
        .map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
}

/// Describes how a task ended.
#[must_use]
pub fn format_exit(result: &ExitResult) -> String {
    if let Some(err) = &result.error {
        return format!("failed: {err}");
    }
    if result.signal != 0 {
        return format!("killed by signal {}", result.signal);
    }
    format!("exited with code {}", result.exit_code)
}

/// Yes/no rendering for capability checks.
#[must_use]
pub const fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
