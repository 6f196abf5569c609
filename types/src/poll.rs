//! Poll, option, tally, and vote entities.
//!
//! These types sit at the storage boundary: the persistence collaborator
//! owns them long-term, the core reads polls and writes votes through the
//! `livepoll-store` traits.

use serde::{Deserialize, Serialize};

use crate::hash::{AddressHash, DeviceHash};
use crate::id::{OptionId, PollId};
use crate::time::Timestamp;

/// A poll as stored by the persistence collaborator.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Poll {
    pub id: PollId,
    pub question: String,
    pub created_at: Timestamp,
    /// When set, no votes are admitted at or after this instant.
    pub expires_at: Option<Timestamp>,
    pub options: Vec<PollOption>,
}

impl Poll {
    /// Whether the poll no longer admits votes at `now`.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        match self.expires_at {
            Some(expires_at) => now >= expires_at,
            None => false,
        }
    }

    /// Whether `option_id` belongs to this poll.
    pub fn has_option(&self, option_id: &OptionId) -> bool {
        self.options.iter().any(|o| &o.id == option_id)
    }
}

/// One selectable option of a poll.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PollOption {
    pub id: OptionId,
    pub label: String,
    pub sort_order: u32,
}

/// Current vote count for a single option. Broadcast to live viewers on
/// every accepted vote.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionCount {
    pub option_id: OptionId,
    pub count: u64,
}

/// A recorded vote. Only hashes of the requester's address and device are
/// ever stored.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VoteRecord {
    pub poll_id: PollId,
    pub option_id: OptionId,
    pub address_hash: AddressHash,
    pub device_hash: DeviceHash,
    pub verified: bool,
    pub timestamp: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn poll_with_expiry(expires_at: Option<u64>) -> Poll {
        Poll {
            id: PollId::new("p1"),
            question: "favorite color?".to_string(),
            created_at: Timestamp::new(1_000),
            expires_at: expires_at.map(Timestamp::new),
            options: vec![
                PollOption {
                    id: OptionId::new("a"),
                    label: "red".to_string(),
                    sort_order: 0,
                },
                PollOption {
                    id: OptionId::new("b"),
                    label: "blue".to_string(),
                    sort_order: 1,
                },
            ],
        }
    }

    #[test]
    fn poll_without_expiry_never_expires() {
        let poll = poll_with_expiry(None);
        assert!(!poll.is_expired(Timestamp::new(u64::MAX)));
    }

    #[test]
    fn poll_expires_at_the_boundary() {
        let poll = poll_with_expiry(Some(5_000));
        assert!(!poll.is_expired(Timestamp::new(4_999)));
        assert!(poll.is_expired(Timestamp::new(5_000)));
    }

    #[test]
    fn option_membership() {
        let poll = poll_with_expiry(None);
        assert!(poll.has_option(&OptionId::new("a")));
        assert!(!poll.has_option(&OptionId::new("z")));
    }
}
