//! Tracking policy: the remotely configured parameters that govern
//! whether and how often position is sampled.
//!
//! The policy is the single source of truth consulted at each tick. Only
//! the settings synchronizer replaces it, and only after the remote
//! authority accepts the request. The allowed window is expressed as
//! wall-clock minute-of-day values; a window is open at minute `m` iff
//! `window_start <= m < window_end`. This check is deliberately
//! non-wrapping: a window whose start is at or after its end is permanently
//! closed, matching the observed behavior of the deployed system.

use chrono::Timelike;
use serde::{Deserialize, Serialize};

/// Minutes in a day; window bounds live in `[0, 1440)`.
pub const MINUTES_PER_DAY: u16 = 1440;

/// Smallest accepted polling interval.
pub const MIN_INTERVAL_MS: i64 = 1000;

/// Remotely configured tracking parameters.
///
/// Serialized to/from TOML by the policy store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// Whether sampling is enabled at all.
    #[serde(default)]
    pub tracking_enabled: bool,
    /// Delay between scheduling ticks, in milliseconds.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: i64,
    /// First minute-of-day at which sampling is allowed (inclusive).
    #[serde(default = "default_window_start")]
    pub window_start: u16,
    /// First minute-of-day at which sampling is no longer allowed.
    #[serde(default = "default_window_end")]
    pub window_end: u16,
}

fn default_interval_ms() -> i64 {
    600_000 // 10 minutes
}
fn default_window_start() -> u16 {
    8 * 60 // 08:00
}
fn default_window_end() -> u16 {
    18 * 60 // 18:00
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            tracking_enabled: false,
            interval_ms: default_interval_ms(),
            window_start: default_window_start(),
            window_end: default_window_end(),
        }
    }
}

impl Policy {
    /// Whether the allowed window is open at the given minute-of-day.
    ///
    /// Non-wrapping: `window_start >= window_end` is always closed.
    pub fn window_open(&self, minute_of_day: u16) -> bool {
        self.window_start <= minute_of_day && minute_of_day < self.window_end
    }

    /// Interval clamped to the accepted minimum.
    pub fn effective_interval_ms(&self) -> i64 {
        self.interval_ms.max(MIN_INTERVAL_MS)
    }
}

/// Current local wall-clock minute-of-day.
pub fn current_minute_of_day() -> u16 {
    let now = chrono::Local::now();
    (now.hour() * 60 + now.minute()) as u16
}

/// Parse a minute-of-day out of an ISO-ish timestamp bearing `HH:MM:SS`
/// (the authority sends values like `0001-01-01T08:00:00`). A bare
/// `HH:MM[:SS]` string is accepted as well.
pub fn parse_minute_of_day(value: &str) -> Option<u16> {
    let time_part = value.rsplit('T').next()?;
    let mut parts = time_part.split(':');
    let hour: u16 = parts.next()?.trim().parse().ok()?;
    let minute: u16 = parts.next()?.trim().parse().ok()?;
    if hour > 23 || minute > 59 {
        return None;
    }
    Some(hour * 60 + minute)
}
