//! Sliding-window rate limiting per origin address, with escalating
//! penalties.
//!
//! Requests are counted over a trailing 5 minute window keyed by the
//! address hash. Occasional legitimate bursts (a shared office network, a
//! family device) classify as low-risk or neutral; sustained high-frequency
//! traffic from one address earns a 10 minute cooldown and a 6 hour penalty
//! marker. The whitelist/penalty markers mean the classification does not
//! have to be re-derived while an address's trust class is established.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use livepoll_types::{AddressHash, Timestamp};
use tracing::warn;

use crate::error::AdmissionError;
use crate::redis_backend::RedisBackend;

/// Trailing window over which requests are counted.
pub const RATE_WINDOW_MS: u64 = 5 * 60 * 1_000;
/// Cooldown applied to abusive addresses.
pub const COOLDOWN_MS: u64 = 10 * 60 * 1_000;
/// Lifetime of a low-risk whitelist grant.
pub const WHITELIST_MS: u64 = 24 * 60 * 60 * 1_000;
/// Lifetime of the abusive penalty marker.
pub const PENALTY_MS: u64 = 6 * 60 * 60 * 1_000;

/// At most this many requests in the window classify as low-risk.
const CLEAN_THRESHOLD: usize = 2;
/// At most this many requests in the window classify as neutral.
const NEUTRAL_THRESHOLD: usize = 5;

/// Trust delta for a low-risk address.
pub const TRUST_DELTA_CLEAN: i32 = 15;
/// Trust delta for a neutral address.
pub const TRUST_DELTA_NEUTRAL: i32 = 5;
/// Trust delta for an abusive or cooling-down address.
pub const TRUST_DELTA_ABUSIVE: i32 = -30;

/// What the limiter concluded about one request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateVerdict {
    /// Signed adjustment reflecting how clean this origin looks.
    pub trust_delta: i32,
    /// Remaining cooldown in milliseconds; zero when not cooling down.
    pub cooldown_ms: u64,
}

/// Per-address request history within the trailing window.
#[derive(Debug, Default)]
struct RateWindowEntry {
    /// Request timestamps, oldest first. Pruned before every count.
    timestamps: VecDeque<Timestamp>,
    cooldown_until: Option<Timestamp>,
    whitelisted_until: Option<Timestamp>,
    penalized_until: Option<Timestamp>,
}

impl RateWindowEntry {
    fn prune(&mut self, now: Timestamp) {
        let cutoff = now.as_millis().saturating_sub(RATE_WINDOW_MS);
        while let Some(front) = self.timestamps.front() {
            if front.as_millis() < cutoff {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Whether this entry carries no live state at `now` and can be
    /// evicted.
    fn is_stale(&self, now: Timestamp) -> bool {
        let marker_live = |marker: Option<Timestamp>| marker.is_some_and(|until| until > now);
        self.timestamps
            .back()
            .map_or(true, |last| last.has_expired(RATE_WINDOW_MS, now))
            && !marker_live(self.cooldown_until)
            && !marker_live(self.penalized_until)
            && !marker_live(self.whitelisted_until)
    }
}

/// In-process sliding-window limiter.
#[derive(Default)]
struct MemoryRateLimiter {
    entries: Mutex<HashMap<AddressHash, RateWindowEntry>>,
}

impl MemoryRateLimiter {
    fn check(&self, address: &AddressHash, now: Timestamp) -> RateVerdict {
        let mut entries = self.entries.lock().expect("rate lock poisoned");
        let entry = entries.entry(address.clone()).or_default();

        // Active cooldown short-circuits; counters stay untouched.
        if let Some(until) = entry.cooldown_until {
            let remaining = until.remaining_ms(now);
            if remaining > 0 {
                return RateVerdict {
                    trust_delta: TRUST_DELTA_ABUSIVE,
                    cooldown_ms: remaining,
                };
            }
            entry.cooldown_until = None;
        }

        entry.timestamps.push_back(now);
        entry.prune(now);

        let count = entry.timestamps.len();
        if count <= CLEAN_THRESHOLD {
            entry.whitelisted_until = Some(now.plus(WHITELIST_MS));
            RateVerdict {
                trust_delta: TRUST_DELTA_CLEAN,
                cooldown_ms: 0,
            }
        } else if count <= NEUTRAL_THRESHOLD {
            RateVerdict {
                trust_delta: TRUST_DELTA_NEUTRAL,
                cooldown_ms: 0,
            }
        } else {
            entry.cooldown_until = Some(now.plus(COOLDOWN_MS));
            entry.penalized_until = Some(now.plus(PENALTY_MS));
            warn!(address = %address, count, "address classified abusive, cooling down");
            RateVerdict {
                trust_delta: TRUST_DELTA_ABUSIVE,
                cooldown_ms: COOLDOWN_MS,
            }
        }
    }

    fn sweep(&self, now: Timestamp) -> usize {
        let mut entries = self.entries.lock().expect("rate lock poisoned");
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_stale(now));
        before - entries.len()
    }

    fn len(&self) -> usize {
        self.entries.lock().expect("rate lock poisoned").len()
    }
}

enum RateBackend {
    Memory(MemoryRateLimiter),
    Redis(RedisBackend),
}

/// Tracks request velocity per origin address and issues cooldowns.
///
/// Two interchangeable backends with identical policy semantics: an
/// in-process map for single-instance deployments and the shared Redis
/// store for fleets. A Redis failure is fail-closed — it surfaces as
/// [`AdmissionError::StoreUnavailable`] instead of silently falling back
/// to per-instance counters.
pub struct RateLimiter {
    backend: RateBackend,
}

impl RateLimiter {
    pub fn in_memory() -> Self {
        Self {
            backend: RateBackend::Memory(MemoryRateLimiter::default()),
        }
    }

    pub fn with_redis(backend: RedisBackend) -> Self {
        Self {
            backend: RateBackend::Redis(backend),
        }
    }

    /// Record this request and classify the address.
    pub async fn check(
        &self,
        address: &AddressHash,
        now: Timestamp,
    ) -> Result<RateVerdict, AdmissionError> {
        match &self.backend {
            RateBackend::Memory(memory) => Ok(memory.check(address, now)),
            RateBackend::Redis(redis) => redis.check_rate(address, now).await,
        }
    }

    /// Evict entries with no live window, cooldown, or marker state.
    /// Redis expires its keys by TTL and needs no sweeping.
    pub fn sweep(&self, now: Timestamp) -> usize {
        match &self.backend {
            RateBackend::Memory(memory) => memory.sweep(now),
            RateBackend::Redis(_) => 0,
        }
    }

    /// Number of tracked addresses (in-process backend only).
    pub fn tracked(&self) -> usize {
        match &self.backend {
            RateBackend::Memory(memory) => memory.len(),
            RateBackend::Redis(_) => 0,
        }
    }
}
