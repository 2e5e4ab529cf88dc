//! Shared utility functions

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
#[inline]
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Round a distance to whole centimetres.
#[inline]
pub fn round_cm(meters: f32) -> f32 {
    (meters * 100.0).round() / 100.0
}
