use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;

use log::{debug, info, warn};
use tokio::sync::RwLock;

use super::NodeId;
use crate::network::Transport;

/// One other known node.
#[derive(Debug, Clone)]
pub struct Peer {
    pub id: NodeId,
    pub address: SocketAddr,
    pub last_seen: Instant,
}

/// This node's current belief about which peers exist.
///
/// Readers always get a cloned snapshot, so an election in flight never
/// observes a half-applied refresh.
pub struct Membership {
    self_id: NodeId,
    self_addr: SocketAddr,
    peers: RwLock<HashMap<NodeId, Peer>>,
}

impl Membership {
    pub fn new(self_id: NodeId, self_addr: SocketAddr) -> Self {
        Self {
            self_id,
            self_addr,
            peers: RwLock::new(HashMap::new()),
        }
    }

    /// All known peers ordered by id.
    pub async fn peers(&self) -> Vec<Peer> {
        let mut peers: Vec<Peer> = self.peers.read().await.values().cloned().collect();
        peers.sort_by_key(|p| p.id);
        peers
    }

    pub async fn ids(&self) -> Vec<NodeId> {
        self.peers().await.into_iter().map(|p| p.id).collect()
    }

    pub async fn get(&self, id: NodeId) -> Option<Peer> {
        self.peers.read().await.get(&id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.peers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.peers.read().await.is_empty()
    }

    /// Peers whose id is higher than this node's.
    pub async fn candidates(&self) -> Vec<Peer> {
        self.peers()
            .await
            .into_iter()
            .filter(|p| p.id > self.self_id)
            .collect()
    }

    /// Record a peer that announced itself. Returns `true` if it was new.
    pub async fn announce(&self, id: NodeId, address: SocketAddr) -> bool {
        if id == self.self_id {
            return false;
        }

        let mut peers = self.peers.write().await;
        match peers.get_mut(&id) {
            Some(existing) => {
                existing.last_seen = Instant::now();
                false
            }
            None => {
                info!("Node {} learned about peer {} at {}", self.self_id, id, address);
                peers.insert(
                    id,
                    Peer {
                        id,
                        address,
                        last_seen: Instant::now(),
                    },
                );
                true
            }
        }
    }

    /// Query every discovered address for its id and replace the table with
    /// the peers that answered.
    pub async fn refresh(
        &self,
        transport: &Transport,
        discovered: Vec<SocketAddr>,
    ) -> HashMap<NodeId, Peer> {
        let targets: Vec<SocketAddr> = discovered
            .into_iter()
            .filter(|addr| *addr != self.self_addr)
            .collect();

        let now = Instant::now();
        let mut fresh = HashMap::with_capacity(targets.len());
        for (address, result) in transport.query_ids(targets).await {
            match result {
                Ok(id) if id == self.self_id => {
                    warn!(
                        "Node {} found its own id at foreign address {}; ignoring",
                        self.self_id, address
                    );
                }
                Ok(id) => {
                    fresh.insert(
                        id,
                        Peer {
                            id,
                            address,
                            last_seen: now,
                        },
                    );
                }
                Err(e) => debug!("Peer at {} skipped this round: {}", address, e),
            }
        }

        let mut peers = self.peers.write().await;
        *peers = fresh;
        debug!("Node {} membership refreshed: {} peer(s)", self.self_id, peers.len());
        peers.clone()
    }
}
