//! Vote persistence and tally access.

use livepoll_types::{DeviceHash, OptionCount, PollId, VoteRecord};

use crate::error::StoreError;

/// Vote storage with a `(poll, device hash)` uniqueness guarantee.
pub trait VoteStore: Send + Sync {
    /// Whether a vote from this device is already recorded for the poll.
    ///
    /// This is a cheap advisory check; the authoritative guard against
    /// racing duplicates is the unique constraint inside [`insert_vote`].
    ///
    /// [`insert_vote`]: VoteStore::insert_vote
    fn has_vote(&self, poll_id: &PollId, device: &DeviceHash) -> Result<bool, StoreError>;

    /// Record a vote and bump the option's tally.
    ///
    /// Must be atomic with respect to concurrent inserts for the same
    /// `(poll_id, device_hash)` pair: exactly one of two racing inserts
    /// succeeds, the other fails with [`StoreError::Duplicate`].
    fn insert_vote(&self, vote: VoteRecord) -> Result<(), StoreError>;

    /// Current per-option counts for a poll, in option sort order, with
    /// zero entries for options nobody picked yet.
    fn tallies(&self, poll_id: &PollId) -> Result<Vec<OptionCount>, StoreError>;
}
