//! Fundamental types for the LivePoll core.
//!
//! This crate defines the types shared across every other crate in the
//! workspace: poll and option identifiers, one-way hashes of requester
//! identities, millisecond timestamps, and the poll/tally entities that sit
//! at the storage boundary.

pub mod hash;
pub mod id;
pub mod poll;
pub mod time;

pub use hash::{AddressHash, DeviceHash};
pub use id::{OptionId, PollId};
pub use poll::{OptionCount, Poll, PollOption, VoteRecord};
pub use time::Timestamp;
