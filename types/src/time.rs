//! Timestamp type used throughout the core.
//!
//! Timestamps are Unix epoch **milliseconds** (UTC). Every window, cooldown,
//! and expiry in the admission policy is defined in milliseconds, so the
//! shared type carries that resolution directly.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// A Unix timestamp in milliseconds since epoch (UTC).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The epoch (time zero).
    pub const EPOCH: Self = Self(0);

    pub fn new(millis: u64) -> Self {
        Self(millis)
    }

    /// Get the current system time as a `Timestamp`.
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before Unix epoch")
            .as_millis() as u64;
        Self(millis)
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Milliseconds elapsed since this timestamp (relative to `now`).
    ///
    /// Saturates at zero when this timestamp lies in the future.
    pub fn elapsed_since(&self, now: Timestamp) -> u64 {
        now.0.saturating_sub(self.0)
    }

    /// Whether this timestamp + duration has passed relative to `now`.
    pub fn has_expired(&self, duration_ms: u64, now: Timestamp) -> bool {
        now.0 >= self.0.saturating_add(duration_ms)
    }

    /// This timestamp shifted forward by `duration_ms`.
    pub fn plus(&self, duration_ms: u64) -> Timestamp {
        Self(self.0.saturating_add(duration_ms))
    }

    /// Milliseconds remaining until this timestamp, zero if already past.
    pub fn remaining_ms(&self, now: Timestamp) -> u64 {
        self.0.saturating_sub(now.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_is_inclusive_of_the_boundary() {
        let t = Timestamp::new(1_000);
        assert!(!t.has_expired(500, Timestamp::new(1_499)));
        assert!(t.has_expired(500, Timestamp::new(1_500)));
    }

    #[test]
    fn elapsed_saturates_for_future_timestamps() {
        let t = Timestamp::new(2_000);
        assert_eq!(t.elapsed_since(Timestamp::new(1_000)), 0);
        assert_eq!(t.elapsed_since(Timestamp::new(2_500)), 500);
    }

    #[test]
    fn remaining_counts_down_to_zero() {
        let t = Timestamp::new(2_000);
        assert_eq!(t.remaining_ms(Timestamp::new(1_200)), 800);
        assert_eq!(t.remaining_ms(Timestamp::new(2_000)), 0);
        assert_eq!(t.remaining_ms(Timestamp::new(9_000)), 0);
    }
}
