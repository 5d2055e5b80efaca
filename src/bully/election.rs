use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info};

use super::node::BullyNode;
use super::{ElectionOutcome, ElectionStrategy, NodeId};
use crate::network::{CoordinatorRequest, ElectionRequest, Message};

/// Holds the election-in-flight flag for the lifetime of one election.
///
/// Acquisition never waits: a second attempt while the flag is held simply
/// fails. The flag is released on drop, which covers early returns, panics
/// and cancellation of the owning future.
pub(super) struct ElectionGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> ElectionGuard<'a> {
    pub(super) fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for ElectionGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl BullyNode {
    /// Run one election round from this node.
    ///
    /// Returns [`ElectionOutcome::Skipped`] without sending anything when an
    /// election is already in flight here or the node is not alive.
    pub async fn start_election(&self) -> ElectionOutcome {
        let Some(_guard) = ElectionGuard::try_acquire(&self.election_in_flight) else {
            debug!("Node {}: election already in progress, skipping", self.id);
            return ElectionOutcome::Skipped;
        };

        if !self.is_alive() {
            debug!("Node {}: not alive, skipping election", self.id);
            return ElectionOutcome::Skipped;
        }

        let candidates = self.membership.candidates().await;
        info!(
            "Node {} starting election with {} candidate(s)",
            self.id,
            candidates.len()
        );

        let mut acknowledged: Vec<NodeId> = Vec::new();
        if !candidates.is_empty() {
            let request = Message::Election(ElectionRequest::new(self.id));
            for (candidate, result) in self.multicast(&candidates, request).await {
                match result {
                    Ok(_) => acknowledged.push(candidate),
                    Err(e) => debug!("Candidate {candidate} did not answer ELECTION: {e}"),
                }
            }
        }

        match (self.config.strategy, acknowledged.iter().max().copied()) {
            (_, None) => {
                self.declare_self_leader().await;
                ElectionOutcome::SelfLeader
            }
            (ElectionStrategy::Classic, Some(_)) => {
                info!(
                    "Node {} deferring to {} higher candidate(s)",
                    self.id,
                    acknowledged.len()
                );
                ElectionOutcome::Deferred
            }
            (ElectionStrategy::Improved, Some(highest)) => {
                self.appoint(highest).await;
                ElectionOutcome::Appointed(highest)
            }
        }
    }

    async fn declare_self_leader(&self) {
        let previous = self.replace_leader(self.id).await;
        info!(
            "Node {} is the highest live node; declaring itself leader (was {:?})",
            self.id, previous
        );

        self.announce_coordinator(self.id).await;
        self.became_leader();
    }

    async fn appoint(&self, leader: NodeId) {
        let previous = self.replace_leader(leader).await;
        info!("Node {} appointing {} as leader", self.id, leader);

        self.announce_coordinator(leader).await;
        if previous == Some(self.id) {
            self.step_down();
        }
    }

    async fn announce_coordinator(&self, leader: NodeId) {
        let message = Message::Coordinator(CoordinatorRequest {
            src: self.id,
            leader_id: leader,
        });

        let results = self.broadcast(message).await;
        let delivered = results.iter().filter(|(_, r)| r.is_ok()).count();
        info!(
            "Node {} announced leader {} to {}/{} peer(s)",
            self.id,
            leader,
            delivered,
            results.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::Arc;

    use crate::bully::{BullyConfig, LogLabeler};
    use crate::network::StaticDiscovery;

    fn node(id: NodeId, port: u16, strategy: ElectionStrategy) -> Arc<BullyNode> {
        let cfg = BullyConfig::new(id, SocketAddr::from(([127, 0, 0, 1], port)))
            .with_strategy(strategy);
        BullyNode::new(
            cfg,
            Arc::new(StaticDiscovery::default()),
            Arc::new(LogLabeler),
        )
        .expect("node")
    }

    #[test]
    fn guard_is_exclusive_and_released_on_drop() {
        let flag = AtomicBool::new(false);

        let first = ElectionGuard::try_acquire(&flag);
        assert!(first.is_some());
        assert!(ElectionGuard::try_acquire(&flag).is_none());

        drop(first);
        assert!(!flag.load(Ordering::Acquire));
        assert!(ElectionGuard::try_acquire(&flag).is_some());
    }

    #[tokio::test]
    async fn lone_node_declares_itself_without_messages() {
        let n = node(3, 48003, ElectionStrategy::Classic);

        assert_eq!(n.start_election().await, ElectionOutcome::SelfLeader);
        assert_eq!(n.leader_id().await, Some(3));
        assert!(n.is_ready());
        assert!(!n.election_in_flight());
        assert_eq!(n.counters().snapshot().outbound(), 0);
    }

    #[tokio::test]
    async fn unreachable_candidates_lead_to_self_declaration() {
        let n = node(5, 48005, ElectionStrategy::Classic);
        // Nothing listens on port 1.
        n.membership().announce(9, "127.0.0.1:1".parse().unwrap()).await;

        assert_eq!(n.start_election().await, ElectionOutcome::SelfLeader);
        assert_eq!(n.leader_id().await, Some(5));
        // One ELECTION to 9, then one COORDINATOR to 9.
        let snap = n.counters().snapshot();
        assert_eq!(snap.election, 1);
        assert_eq!(snap.coordinator, 1);
    }

    #[tokio::test]
    async fn election_is_skipped_while_flag_is_held() {
        let n = node(2, 48012, ElectionStrategy::Improved);
        let _held = ElectionGuard::try_acquire(&n.election_in_flight).unwrap();

        assert_eq!(n.start_election().await, ElectionOutcome::Skipped);
        assert_eq!(n.leader_id().await, None);
    }

    #[tokio::test]
    async fn dead_node_does_not_elect_itself() {
        let n = node(2, 48022, ElectionStrategy::Classic);
        n.kill();

        assert_eq!(n.start_election().await, ElectionOutcome::Skipped);
        assert_eq!(n.leader_id().await, None);
        assert!(!n.election_in_flight());
    }
}
