//! Wire format shared by the HTTP server and the peer transport.
//!
//! Every message is a small JSON document. Paths and methods follow the
//! endpoint table the nodes agree on:
//!
//! | message       | method   | path           |
//! |---------------|----------|----------------|
//! | ping          | GET      | `/ping`        |
//! | bootup        | POST     | `/bootup`      |
//! | election      | GET/POST | `/election`    |
//! | coordinator   | PUT      | `/coordinator` |
//! | id query      | GET      | `/pod_id`      |

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::bully::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    Election,
    Coordinator,
    Ping,
    #[serde(alias = "BOOTUP")]
    MembershipAnnounce,
    IdQuery,
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MessageKind::Election => "ELECTION",
            MessageKind::Coordinator => "COORDINATOR",
            MessageKind::Ping => "PING",
            MessageKind::MembershipAnnounce => "MEMBERSHIP_ANNOUNCE",
            MessageKind::IdQuery => "ID_QUERY",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootupRequest {
    pub src: NodeId,
    pub address: SocketAddr,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub id: NodeId,
    pub address: SocketAddr,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootupResponse {
    pub leader_id: Option<NodeId>,
    pub node_ids: Vec<NodeId>,
    #[serde(default)]
    pub peers: Vec<PeerInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionRequest {
    pub src: NodeId,
    #[serde(rename = "type", default = "election_kind")]
    pub kind: MessageKind,
}

fn election_kind() -> MessageKind {
    MessageKind::Election
}

impl ElectionRequest {
    pub fn new(src: NodeId) -> Self {
        Self {
            src,
            kind: MessageKind::Election,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorRequest {
    pub src: NodeId,
    pub leader_id: NodeId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReply {
    pub status: String,
}

impl StatusReply {
    pub fn new(status: &str) -> Self {
        Self {
            status: status.to_string(),
        }
    }
}

/// An outbound message, addressed by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Ping,
    QueryId,
    Bootup(BootupRequest),
    Election(ElectionRequest),
    Coordinator(CoordinatorRequest),
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Ping => MessageKind::Ping,
            Message::QueryId => MessageKind::IdQuery,
            Message::Bootup(_) => MessageKind::MembershipAnnounce,
            Message::Election(_) => MessageKind::Election,
            Message::Coordinator(_) => MessageKind::Coordinator,
        }
    }

    pub fn path(&self) -> &'static str {
        match self {
            Message::Ping => "/ping",
            Message::QueryId => "/pod_id",
            Message::Bootup(_) => "/bootup",
            Message::Election(_) => "/election",
            Message::Coordinator(_) => "/coordinator",
        }
    }
}

/// A successful answer to a [`Message`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Alive,
    Id(NodeId),
    Bootup(BootupResponse),
    Ack,
    Acknowledged,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn election_request_accepts_missing_type() {
        let req: ElectionRequest = serde_json::from_str(r#"{"src": 4}"#).unwrap();
        assert_eq!(req, ElectionRequest::new(4));
    }

    #[test]
    fn message_kind_uses_upper_case_names() {
        let json = serde_json::to_string(&MessageKind::MembershipAnnounce).unwrap();
        assert_eq!(json, "\"MEMBERSHIP_ANNOUNCE\"");

        let legacy: MessageKind = serde_json::from_str("\"BOOTUP\"").unwrap();
        assert_eq!(legacy, MessageKind::MembershipAnnounce);
    }

    #[test]
    fn bootup_response_reports_unknown_leader_as_null() {
        let resp = BootupResponse {
            leader_id: None,
            node_ids: vec![1, 2],
            peers: vec![],
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert!(json["leader_id"].is_null());
        assert_eq!(json["node_ids"], serde_json::json!([1, 2]));
    }
}
