use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use rand::Rng;
use tokio::time::sleep;

use super::node::BullyNode;
use super::ElectionOutcome;
use crate::network::Message;

/// Periodic membership refresh and leader liveness check.
pub struct FailureDetector {
    node: Arc<BullyNode>,
    interval: Duration,
    jitter: Duration,
}

impl FailureDetector {
    pub fn new(node: Arc<BullyNode>) -> Self {
        let interval = Duration::from_millis(node.config().heartbeat_interval);
        let jitter = Duration::from_millis(node.config().heartbeat_jitter);
        Self {
            node,
            interval,
            jitter,
        }
    }

    fn next_delay(&self) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return self.interval;
        }
        self.interval + Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
    }

    pub async fn run(self) {
        loop {
            sleep(self.next_delay()).await;
            if let Some(outcome) = self.node.heartbeat().await {
                debug!("Node {} heartbeat election: {:?}", self.node.id(), outcome);
            }
        }
    }
}

impl BullyNode {
    /// One detector pass: refresh membership, then start an election if the
    /// leader is unknown, unreachable, or outranked by a live node.
    pub async fn heartbeat(self: &Arc<Self>) -> Option<ElectionOutcome> {
        if !self.is_alive() {
            return None;
        }

        let members = self.refresh_membership().await;
        let highest_peer = members.keys().max().copied();
        let leader = self.leader_id().await;

        let reason = match leader {
            None => Some("no known leader".to_string()),
            Some(leader) if leader == self.id => match highest_peer {
                Some(peer) if peer > self.id => {
                    Some(format!("peer {peer} outranks this leader"))
                }
                _ => None,
            },
            Some(leader) => {
                if !members.contains_key(&leader) {
                    Some(format!("leader {leader} is not among responsive peers"))
                } else if let Err(e) = self.unicast(leader, &Message::Ping).await {
                    Some(format!("leader {leader} failed ping: {e}"))
                } else if self.id > leader {
                    Some(format!("own id outranks leader {leader}"))
                } else {
                    match highest_peer {
                        Some(peer) if peer > leader => {
                            Some(format!("peer {peer} outranks leader {leader}"))
                        }
                        _ => None,
                    }
                }
            }
        };

        let reason = reason?;
        info!("Node {} starting election: {}", self.id, reason);
        Some(self.start_election().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    use crate::bully::{BullyConfig, LogLabeler};
    use crate::network::StaticDiscovery;

    fn node(id: u64, port: u16, discovery: Vec<SocketAddr>) -> Arc<BullyNode> {
        let mut cfg = BullyConfig::new(id, SocketAddr::from(([127, 0, 0, 1], port)));
        cfg.heartbeat_interval = 100;
        cfg.heartbeat_jitter = 50;
        BullyNode::new(
            cfg,
            Arc::new(StaticDiscovery::new(discovery)),
            Arc::new(LogLabeler),
        )
        .unwrap()
    }

    #[test]
    fn delay_stays_within_jitter_window() {
        let detector = FailureDetector::new(node(1, 50001, vec![]));
        for _ in 0..50 {
            let delay = detector.next_delay();
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(150));
        }
    }

    #[tokio::test]
    async fn heartbeat_without_leader_starts_election() {
        let n = node(1, 50011, vec!["127.0.0.1:1".parse().unwrap()]);
        assert_eq!(n.heartbeat().await, Some(ElectionOutcome::SelfLeader));
        assert_eq!(n.leader_id().await, Some(1));
    }

    #[tokio::test]
    async fn heartbeat_with_vanished_leader_reelects() {
        let n = node(1, 50021, vec![]);
        n.on_coordinator(7).await;

        assert_eq!(n.heartbeat().await, Some(ElectionOutcome::SelfLeader));
        assert_eq!(n.leader_id().await, Some(1));
    }

    #[tokio::test]
    async fn heartbeat_is_quiet_for_sole_leader_and_dead_nodes() {
        let n = node(1, 50031, vec![]);
        n.start_election().await;
        assert_eq!(n.heartbeat().await, None);

        n.kill();
        assert_eq!(n.heartbeat().await, None);
    }
}
