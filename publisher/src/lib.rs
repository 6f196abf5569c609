//! Fire-and-forget publishing of tally updates to the fanout server.
//!
//! Real-time delivery is an enhancement, not a correctness requirement: a
//! vote that was accepted stays accepted even when the fanout transport is
//! down or unconfigured. Transport failures are logged and swallowed, never
//! surfaced to the voter and never retried synchronously.

use livepoll_types::{OptionCount, PollId};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Wire body for the fanout server's `/emit` endpoint.
#[derive(Clone, Debug, Serialize)]
pub struct TallyNotification {
    #[serde(rename = "type")]
    pub kind: String,
    pub poll_id: PollId,
    pub counts: Vec<OptionCount>,
}

impl TallyNotification {
    pub fn new(poll_id: PollId, counts: Vec<OptionCount>) -> Self {
        Self {
            kind: "tally_update".to_string(),
            poll_id,
            counts,
        }
    }
}

/// Best-effort sink for accepted-vote tallies.
///
/// `publish` must return immediately; implementations that do I/O spawn it
/// in the background.
pub trait TallyPublisher: Send + Sync {
    fn publish(&self, poll_id: &PollId, counts: &[OptionCount]);
}

/// Publishes tallies to the fanout server over HTTP.
pub struct HttpPublisher {
    client: reqwest::Client,
    emit_url: String,
}

impl HttpPublisher {
    /// `base_url` is the fanout server root, e.g. `http://127.0.0.1:4001`.
    pub fn new(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()
            .unwrap_or_default();
        Self {
            client,
            emit_url: format!("{}/emit", base_url.trim_end_matches('/')),
        }
    }
}

impl TallyPublisher for HttpPublisher {
    fn publish(&self, poll_id: &PollId, counts: &[OptionCount]) {
        let body = TallyNotification::new(poll_id.clone(), counts.to_vec());
        let client = self.client.clone();
        let url = self.emit_url.clone();

        // Never blocks the voter's acceptance response.
        tokio::spawn(async move {
            match client.post(&url).json(&body).send().await {
                Ok(resp) if resp.status().is_success() => {
                    debug!(poll_id = %body.poll_id, "published tally update");
                }
                Ok(resp) => {
                    warn!(
                        poll_id = %body.poll_id,
                        status = %resp.status(),
                        "fanout server rejected tally update"
                    );
                }
                Err(e) => {
                    warn!(poll_id = %body.poll_id, error = %e, "tally publish failed");
                }
            }
        });
    }
}

/// Used when no fanout transport is configured; drops every update.
pub struct NoopPublisher;

impl TallyPublisher for NoopPublisher {
    fn publish(&self, _poll_id: &PollId, _counts: &[OptionCount]) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use livepoll_types::OptionId;

    #[test]
    fn notification_serializes_with_type_tag() {
        let body = TallyNotification::new(
            PollId::new("p1"),
            vec![OptionCount {
                option_id: OptionId::new("a"),
                count: 3,
            }],
        );
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["type"], "tally_update");
        assert_eq!(json["poll_id"], "p1");
        assert_eq!(json["counts"][0]["option_id"], "a");
        assert_eq!(json["counts"][0]["count"], 3);
    }

    #[tokio::test]
    async fn publish_to_unreachable_transport_does_not_fail() {
        // Nothing listens on this port; the spawned request must fail
        // silently without propagating anything to the caller.
        let publisher = HttpPublisher::new("http://127.0.0.1:1");
        publisher.publish(&PollId::new("p1"), &[]);
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }

    #[test]
    fn noop_publisher_is_a_tally_publisher() {
        let publisher: Box<dyn TallyPublisher> = Box::new(NoopPublisher);
        publisher.publish(&PollId::new("p1"), &[]);
    }
}
