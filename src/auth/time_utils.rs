//! Time utilities for safe timestamp handling.
//!
//! Safe alternatives to direct `SystemTime` arithmetic that could panic.

use crate::auth::error::AuthError;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Get the current timestamp in seconds since the Unix epoch.
///
/// Returns an error instead of panicking in the (rare) case where the
/// system clock reads before the epoch.
pub(crate) fn unix_now() -> Result<i64, AuthError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .map_err(|_| AuthError::Clock("System time is before Unix epoch".to_string()))
}

/// Check whether a request timestamp falls outside the accepted window.
///
/// A timestamp exactly `tolerance` seconds away from `now` (in either
/// direction) is still inside the window.
pub(crate) fn outside_window(timestamp: i64, now: i64, tolerance: Duration) -> bool {
    let tolerance = tolerance.as_secs() as i64;
    (now - timestamp).abs() > tolerance
}
