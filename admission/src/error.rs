//! Admission error types.
//!
//! These are the terminal failures of a submission, as opposed to
//! [`VoteOutcome`](crate::outcome::VoteOutcome) which covers the
//! policy-driven rejections (duplicate, expired poll, rate limit). The
//! split keeps "your request was bad or we could not serve it" apart from
//! "the rules said no".

use livepoll_store::StoreError;
use livepoll_types::PollId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("poll not found: {0}")]
    PollNotFound(PollId),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// The shared counter store is configured but unreachable. Admission
    /// fails closed: the submission is rejected rather than silently
    /// falling back to in-process counters.
    #[error("shared store unavailable: {0}")]
    StoreUnavailable(String),
}
