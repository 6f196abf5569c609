//! The verdict returned for every vote submission.

use livepoll_types::OptionCount;

use crate::nonce::NonceRejection;

/// Final admission verdict for one vote submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VoteOutcome {
    /// The vote was recorded; `counts` are the tallies after the insert.
    Accepted { counts: Vec<OptionCount> },
    /// This device already voted on this poll.
    Duplicate,
    /// The poll's expiry timestamp has passed.
    PollExpired,
    /// Rate limited or trust-rejected. `cooldown_ms` is zero for pure
    /// trust rejections and tells the client how long to back off
    /// otherwise.
    RateLimited { reason: String, cooldown_ms: u64 },
    /// Terminal rejection before any store access: bad nonce or stale
    /// submission timestamp. Never retried.
    Rejected { reason: RejectReason },
}

/// Why a submission was rejected outright.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectReason {
    /// Nonce already used once.
    NonceReplay,
    /// Nonce past its validity window.
    NonceExpired,
    /// Nonce has the wrong length or encoding.
    NonceMalformed,
    /// Submission timestamp older than the allowed skew, or in the future.
    StaleTimestamp,
}

impl RejectReason {
    /// Stable machine-readable code, used in API responses.
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::NonceReplay => "nonce_replay",
            RejectReason::NonceExpired => "nonce_expired",
            RejectReason::NonceMalformed => "nonce_malformed",
            RejectReason::StaleTimestamp => "stale_timestamp",
        }
    }

    /// Human-readable explanation, safe to show to the voter.
    pub fn message(&self) -> &'static str {
        match self {
            RejectReason::NonceReplay => "request token already used (replay detected)",
            RejectReason::NonceExpired => "request token expired, reload the page",
            RejectReason::NonceMalformed => "invalid request token format",
            RejectReason::StaleTimestamp => "request expired or has an invalid timestamp",
        }
    }
}

impl From<NonceRejection> for RejectReason {
    fn from(rejection: NonceRejection) -> Self {
        match rejection {
            NonceRejection::Replay => RejectReason::NonceReplay,
            NonceRejection::Expired => RejectReason::NonceExpired,
            NonceRejection::Malformed => RejectReason::NonceMalformed,
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}
