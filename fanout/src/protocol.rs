//! Wire protocol between fanout server, WebSocket clients, and the
//! admission pipeline's publisher.

use livepoll_types::{OptionCount, PollId};
use serde::{Deserialize, Serialize};

/// A message from a WebSocket client.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Start watching a poll's live updates.
    JoinPoll { poll_id: PollId },
    /// Stop watching a poll.
    LeavePoll { poll_id: PollId },
}

/// An event pushed to subscribed WebSocket clients.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Number of live viewers of the poll, recomputed on every join,
    /// leave, or disconnect.
    ViewerCount { poll_id: PollId, count: usize },
    /// Fresh per-option counts after an accepted vote.
    TallyUpdate {
        poll_id: PollId,
        counts: Vec<OptionCount>,
    },
    /// Protocol error, e.g. an unparseable client message.
    Error { message: String },
}

/// One-shot tally notification posted by the admission pipeline to
/// `/emit`. Matches the publisher's wire body.
#[derive(Clone, Debug, Deserialize)]
pub struct EmitRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub poll_id: PollId,
    pub counts: Vec<OptionCount>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use livepoll_types::OptionId;

    #[test]
    fn client_messages_parse_from_tagged_json() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"join_poll","poll_id":"p1"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::JoinPoll { poll_id } if poll_id == PollId::new("p1")));

        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"leave_poll","poll_id":"p1"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::LeavePoll { .. }));
    }

    #[test]
    fn server_events_serialize_with_type_tag() {
        let event = ServerEvent::TallyUpdate {
            poll_id: PollId::new("p1"),
            counts: vec![OptionCount {
                option_id: OptionId::new("a"),
                count: 2,
            }],
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "tally_update");
        assert_eq!(json["counts"][0]["count"], 2);

        let event = ServerEvent::ViewerCount {
            poll_id: PollId::new("p1"),
            count: 3,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "viewer_count");
        assert_eq!(json["count"], 3);
    }

    #[test]
    fn emit_request_matches_publisher_body() {
        let body = r#"{"type":"tally_update","poll_id":"p1","counts":[{"option_id":"a","count":1}]}"#;
        let req: EmitRequest = serde_json::from_str(body).unwrap();
        assert_eq!(req.kind, "tally_update");
        assert_eq!(req.poll_id, PollId::new("p1"));
        assert_eq!(req.counts.len(), 1);
    }
}
