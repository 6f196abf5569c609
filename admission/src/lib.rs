//! Vote admission for the LivePoll core.
//!
//! Decides, for each incoming vote, whether it is trustworthy enough to
//! accept. The pipeline runs cheap stateless checks first (payload shape,
//! nonce, staleness), then correctness checks against the store (poll
//! existence and expiry, duplicate device vote), and only then the heuristic
//! signals (rate limiting, behavioral trust). Accepted votes are committed
//! through the store and the fresh tallies handed to the fanout publisher.

pub mod error;
pub mod nonce;
pub mod outcome;
pub mod pipeline;
pub mod ratelimit;
pub mod redis_backend;
pub mod trust;

pub use error::AdmissionError;
pub use nonce::{NonceRejection, NonceToken, NonceTracker, NonceVerdict};
pub use outcome::{RejectReason, VoteOutcome};
pub use pipeline::{AdmissionPipeline, VoteRequest};
pub use ratelimit::{RateLimiter, RateVerdict};
pub use redis_backend::RedisBackend;
pub use trust::{behavior_score, evaluate, TrustSignals, TrustVerdict};
