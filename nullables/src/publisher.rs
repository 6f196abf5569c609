//! Nullable publisher — captures tally updates instead of sending them.

use livepoll_publisher::TallyPublisher;
use livepoll_types::{OptionCount, PollId};
use std::sync::Mutex;

/// A [`TallyPublisher`] that records every publish for later assertions.
#[derive(Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<(PollId, Vec<OptionCount>)>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// All captured publishes, in order.
    pub fn published(&self) -> Vec<(PollId, Vec<OptionCount>)> {
        self.published.lock().unwrap().clone()
    }

    /// Number of captured publishes.
    pub fn publish_count(&self) -> usize {
        self.published.lock().unwrap().len()
    }
}

impl TallyPublisher for RecordingPublisher {
    fn publish(&self, poll_id: &PollId, counts: &[OptionCount]) {
        self.published
            .lock()
            .unwrap()
            .push((poll_id.clone(), counts.to_vec()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use livepoll_types::OptionId;

    #[test]
    fn captures_publishes_in_order() {
        let publisher = RecordingPublisher::new();
        publisher.publish(&PollId::new("p1"), &[]);
        publisher.publish(
            &PollId::new("p2"),
            &[OptionCount {
                option_id: OptionId::new("a"),
                count: 1,
            }],
        );

        let published = publisher.published();
        assert_eq!(published.len(), 2);
        assert_eq!(published[0].0, PollId::new("p1"));
        assert_eq!(published[1].1[0].count, 1);
    }
}
