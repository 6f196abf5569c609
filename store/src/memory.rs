//! In-memory storage backend.
//!
//! Backs tests and single-instance deployments. The vote-uniqueness
//! invariant is enforced by an insert-if-absent under one lock, which is
//! what a relational backend expresses as a unique index on
//! `(poll_id, device_hash)`.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use livepoll_types::{DeviceHash, OptionCount, OptionId, Poll, PollId, VoteRecord};

use crate::error::StoreError;
use crate::poll::PollStore;
use crate::vote::VoteStore;

#[derive(Default)]
struct Inner {
    polls: HashMap<PollId, Poll>,
    /// Devices that have voted, per poll. The uniqueness guard.
    voted: HashSet<(PollId, DeviceHash)>,
    votes: Vec<VoteRecord>,
    counts: HashMap<(PollId, OptionId), u64>,
}

/// Thread-safe in-memory poll and vote store.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of recorded votes, across all polls.
    pub fn vote_count(&self) -> usize {
        self.inner.lock().expect("store lock poisoned").votes.len()
    }
}

impl PollStore for MemoryStore {
    fn get_poll(&self, id: &PollId) -> Result<Option<Poll>, StoreError> {
        let inner = self.inner.lock().expect("store lock poisoned");
        Ok(inner.polls.get(id).cloned())
    }

    fn put_poll(&self, poll: Poll) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        inner.polls.insert(poll.id.clone(), poll);
        Ok(())
    }
}

impl VoteStore for MemoryStore {
    fn has_vote(&self, poll_id: &PollId, device: &DeviceHash) -> Result<bool, StoreError> {
        let inner = self.inner.lock().expect("store lock poisoned");
        Ok(inner.voted.contains(&(poll_id.clone(), device.clone())))
    }

    fn insert_vote(&self, vote: VoteRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("store lock poisoned");

        let key = (vote.poll_id.clone(), vote.device_hash.clone());
        if !inner.voted.insert(key) {
            return Err(StoreError::Duplicate(format!(
                "vote exists for poll {} device {}",
                vote.poll_id, vote.device_hash
            )));
        }

        let count_key = (vote.poll_id.clone(), vote.option_id.clone());
        *inner.counts.entry(count_key).or_insert(0) += 1;
        inner.votes.push(vote);
        Ok(())
    }

    fn tallies(&self, poll_id: &PollId) -> Result<Vec<OptionCount>, StoreError> {
        let inner = self.inner.lock().expect("store lock poisoned");
        let poll = inner
            .polls
            .get(poll_id)
            .ok_or_else(|| StoreError::NotFound(format!("poll {poll_id}")))?;

        let mut options: Vec<_> = poll.options.clone();
        options.sort_by_key(|o| o.sort_order);

        Ok(options
            .into_iter()
            .map(|o| {
                let count = inner
                    .counts
                    .get(&(poll_id.clone(), o.id.clone()))
                    .copied()
                    .unwrap_or(0);
                OptionCount {
                    option_id: o.id,
                    count,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use livepoll_types::{PollOption, Timestamp};

    fn seed_poll(store: &MemoryStore) -> PollId {
        let poll_id = PollId::new("poll-1");
        store
            .put_poll(Poll {
                id: poll_id.clone(),
                question: "lunch?".to_string(),
                created_at: Timestamp::new(0),
                expires_at: None,
                options: vec![
                    PollOption {
                        id: OptionId::new("opt-b"),
                        label: "burrito".to_string(),
                        sort_order: 1,
                    },
                    PollOption {
                        id: OptionId::new("opt-a"),
                        label: "ramen".to_string(),
                        sort_order: 0,
                    },
                ],
            })
            .unwrap();
        poll_id
    }

    fn vote(poll_id: &PollId, option: &str, device: &str) -> VoteRecord {
        VoteRecord {
            poll_id: poll_id.clone(),
            option_id: OptionId::new(option),
            address_hash: livepoll_types::AddressHash::new("a".repeat(64)),
            device_hash: DeviceHash::new(device),
            verified: false,
            timestamp: Timestamp::new(1_000),
        }
    }

    #[test]
    fn insert_then_duplicate_is_rejected() {
        let store = MemoryStore::new();
        let poll_id = seed_poll(&store);

        store.insert_vote(vote(&poll_id, "opt-a", "dev-1")).unwrap();
        let second = store.insert_vote(vote(&poll_id, "opt-b", "dev-1"));
        assert!(matches!(second, Err(StoreError::Duplicate(_))));
        assert_eq!(store.vote_count(), 1);
    }

    #[test]
    fn same_device_may_vote_on_different_polls() {
        let store = MemoryStore::new();
        let poll_id = seed_poll(&store);
        let other = PollId::new("poll-2");
        store
            .put_poll(Poll {
                id: other.clone(),
                question: "dinner?".to_string(),
                created_at: Timestamp::new(0),
                expires_at: None,
                options: vec![PollOption {
                    id: OptionId::new("opt-a"),
                    label: "pizza".to_string(),
                    sort_order: 0,
                }],
            })
            .unwrap();

        store.insert_vote(vote(&poll_id, "opt-a", "dev-1")).unwrap();
        store.insert_vote(vote(&other, "opt-a", "dev-1")).unwrap();
        assert_eq!(store.vote_count(), 2);
    }

    #[test]
    fn tallies_are_sorted_and_zero_filled() {
        let store = MemoryStore::new();
        let poll_id = seed_poll(&store);

        store.insert_vote(vote(&poll_id, "opt-b", "dev-1")).unwrap();
        store.insert_vote(vote(&poll_id, "opt-b", "dev-2")).unwrap();

        let tallies = store.tallies(&poll_id).unwrap();
        assert_eq!(tallies.len(), 2);
        assert_eq!(tallies[0].option_id, OptionId::new("opt-a"));
        assert_eq!(tallies[0].count, 0);
        assert_eq!(tallies[1].option_id, OptionId::new("opt-b"));
        assert_eq!(tallies[1].count, 2);
    }

    #[test]
    fn tallies_for_unknown_poll_is_not_found() {
        let store = MemoryStore::new();
        let missing = store.tallies(&PollId::new("nope"));
        assert!(matches!(missing, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn concurrent_inserts_admit_exactly_one() {
        use std::sync::Arc;

        let store = Arc::new(MemoryStore::new());
        let poll_id = seed_poll(&store);

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            let poll_id = poll_id.clone();
            handles.push(std::thread::spawn(move || {
                let option = if i % 2 == 0 { "opt-a" } else { "opt-b" };
                store
                    .insert_vote(vote(&poll_id, option, "same-device"))
                    .is_ok()
            }));
        }

        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|accepted| *accepted)
            .count();
        assert_eq!(successes, 1);
        assert_eq!(store.vote_count(), 1);
    }
}
