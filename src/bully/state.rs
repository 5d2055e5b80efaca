use serde::{Deserialize, Serialize};

use super::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeRole {
    Follower,
    Candidate,
    Leader,
}

/// Result of one call to `start_election`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElectionOutcome {
    /// Another election from this node was already in flight.
    Skipped,
    /// A higher candidate acknowledged; `leader_id` was left for its COORDINATOR.
    Deferred,
    /// Improved strategy only: this node announced a higher acknowledging candidate.
    Appointed(NodeId),
    /// No higher candidate answered; this node declared itself leader.
    SelfLeader,
}

/// Point-in-time view of a node, served by `/health` and the cluster summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeStatus {
    pub id: NodeId,
    pub address: String,
    pub alive: bool,
    pub ready: bool,
    pub role: NodeRole,
    pub leader_id: Option<NodeId>,
    pub election_in_flight: bool,
    pub peers: Vec<NodeId>,
}
