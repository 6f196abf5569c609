//! Per-poll viewer groups.
//!
//! A group exists while at least one connection is watching the poll:
//! `absent → active` on first join, back to `absent` when the last viewer
//! leaves or disconnects. Membership changes and the resulting viewer-count
//! broadcast happen under one lock per registry so counts are never torn,
//! and each poll's broadcast channel preserves per-poll event ordering.

use std::collections::HashMap;
use std::sync::Mutex;

use livepoll_types::{OptionCount, PollId};
use tokio::sync::broadcast;
use tracing::debug;

use crate::protocol::ServerEvent;

/// Capacity of each poll's broadcast channel. Slow consumers lag rather
/// than block the broadcaster.
const CHANNEL_CAPACITY: usize = 256;

struct PollGroup {
    tx: broadcast::Sender<ServerEvent>,
    viewers: usize,
}

/// Registry of live viewer groups, owned exclusively by the fanout server.
#[derive(Default)]
pub struct ViewerGroups {
    groups: Mutex<HashMap<PollId, PollGroup>>,
}

impl ViewerGroups {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a viewer to a poll's group, creating the group on first join.
    ///
    /// Returns the subscription receiver and the new viewer count; the
    /// count is also broadcast to every subscriber, the joiner included.
    pub fn join(&self, poll_id: &PollId) -> (broadcast::Receiver<ServerEvent>, usize) {
        let mut groups = self.groups.lock().expect("group lock poisoned");
        let group = groups.entry(poll_id.clone()).or_insert_with(|| {
            debug!(%poll_id, "viewer group created");
            let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
            PollGroup { tx, viewers: 0 }
        });

        // Subscribe before broadcasting so the joiner sees its own count.
        let rx = group.tx.subscribe();
        group.viewers += 1;
        let count = group.viewers;
        let _ = group.tx.send(ServerEvent::ViewerCount {
            poll_id: poll_id.clone(),
            count,
        });
        (rx, count)
    }

    /// Remove a viewer from a poll's group, broadcasting the new count to
    /// the remaining subscribers and destroying the group when it empties.
    ///
    /// Returns the remaining viewer count.
    pub fn leave(&self, poll_id: &PollId) -> usize {
        let mut groups = self.groups.lock().expect("group lock poisoned");
        let Some(group) = groups.get_mut(poll_id) else {
            return 0;
        };

        group.viewers = group.viewers.saturating_sub(1);
        let count = group.viewers;
        let _ = group.tx.send(ServerEvent::ViewerCount {
            poll_id: poll_id.clone(),
            count,
        });

        if count == 0 {
            debug!(%poll_id, "viewer group destroyed");
            groups.remove(poll_id);
        }
        count
    }

    /// Broadcast fresh tallies to the poll's subscribers. Polls nobody is
    /// watching are skipped. Returns the number of subscribers reached.
    pub fn publish_tallies(&self, poll_id: &PollId, counts: Vec<OptionCount>) -> usize {
        let groups = self.groups.lock().expect("group lock poisoned");
        let Some(group) = groups.get(poll_id) else {
            return 0;
        };
        group
            .tx
            .send(ServerEvent::TallyUpdate {
                poll_id: poll_id.clone(),
                counts,
            })
            .unwrap_or(0)
    }

    /// Current viewer count for a poll, zero when no group exists.
    pub fn viewer_count(&self, poll_id: &PollId) -> usize {
        let groups = self.groups.lock().expect("group lock poisoned");
        groups.get(poll_id).map_or(0, |g| g.viewers)
    }

    /// Number of live groups.
    pub fn group_count(&self) -> usize {
        self.groups.lock().expect("group lock poisoned").len()
    }
}
