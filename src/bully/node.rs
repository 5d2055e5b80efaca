use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::{watch, Mutex};

use super::leadership::LeaderLabeler;
use super::membership::{Membership, Peer};
use super::{BullyConfig, BullyError, ElectionOutcome, ElectionStrategy, NodeId, NodeRole, NodeStatus};
use crate::network::{
    BootupRequest, BootupResponse, Discovery, Message, MessageCounters, NetworkError, PeerInfo,
    Reply, Transport,
};

pub struct BullyNode {
    pub(super) id: NodeId,
    pub(super) config: BullyConfig,

    // Belief state
    pub(super) alive: AtomicBool,
    pub(super) ready: AtomicBool,
    pub(super) leader_id: Mutex<Option<NodeId>>,
    pub(super) election_in_flight: AtomicBool,

    pub(super) membership: Membership,
    pub(super) transport: Transport,
    pub(super) counters: Arc<MessageCounters>,

    // External collaborators
    pub(super) discovery: Arc<dyn Discovery>,
    pub(super) labeler: Arc<dyn LeaderLabeler>,
    pub(super) shutdown: Arc<watch::Sender<bool>>,
}

impl BullyNode {
    pub fn new(
        config: BullyConfig,
        discovery: Arc<dyn Discovery>,
        labeler: Arc<dyn LeaderLabeler>,
    ) -> Result<Arc<Self>, BullyError> {
        let counters = Arc::new(MessageCounters::default());
        let transport = Transport::new(
            config.node_id,
            config.address,
            config.request_timeout(),
            Arc::clone(&counters),
        )?;
        let (shutdown, _) = watch::channel(false);

        Ok(Arc::new(Self {
            id: config.node_id,
            membership: Membership::new(config.node_id, config.address),
            config,
            alive: AtomicBool::new(true),
            ready: AtomicBool::new(false),
            leader_id: Mutex::new(None),
            election_in_flight: AtomicBool::new(false),
            transport,
            counters,
            discovery,
            labeler,
            shutdown: Arc::new(shutdown),
        }))
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn address(&self) -> SocketAddr {
        self.config.address
    }

    pub fn config(&self) -> &BullyConfig {
        &self.config
    }

    pub fn membership(&self) -> &Membership {
        &self.membership
    }

    pub fn counters(&self) -> &MessageCounters {
        &self.counters
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn election_in_flight(&self) -> bool {
        self.election_in_flight.load(Ordering::Acquire)
    }

    pub async fn leader_id(&self) -> Option<NodeId> {
        *self.leader_id.lock().await
    }

    /// Receiver that flips to `true` once a stepdown asks for a restart.
    pub fn subscribe_shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    pub fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    pub async fn status(&self) -> NodeStatus {
        let leader_id = self.leader_id().await;
        let election_in_flight = self.election_in_flight();
        let role = if leader_id == Some(self.id) {
            NodeRole::Leader
        } else if election_in_flight {
            NodeRole::Candidate
        } else {
            NodeRole::Follower
        };

        NodeStatus {
            id: self.id,
            address: self.address().to_string(),
            alive: self.is_alive(),
            ready: self.is_ready(),
            role,
            leader_id,
            election_in_flight,
            peers: self.membership.ids().await,
        }
    }

    /// Overwrite the believed leader, returning the previous belief.
    pub(super) async fn replace_leader(&self, leader: NodeId) -> Option<NodeId> {
        self.leader_id.lock().await.replace(leader)
    }

    pub async fn refresh_membership(&self) -> HashMap<NodeId, Peer> {
        let discovered = self.discovery.discover().await;
        self.membership.refresh(&self.transport, discovered).await
    }

    pub async fn unicast(&self, peer_id: NodeId, message: &Message) -> Result<Reply, BullyError> {
        if peer_id == self.id {
            return Err(NetworkError::SelfAddressed(peer_id).into());
        }
        let peer = self
            .membership
            .get(peer_id)
            .await
            .ok_or(BullyError::UnknownPeer(peer_id))?;
        Ok(self.transport.unicast(peer.id, peer.address, message).await?)
    }

    /// Send `message` to `peers` concurrently and collect every outcome.
    pub async fn multicast(
        &self,
        peers: &[Peer],
        message: Message,
    ) -> Vec<(NodeId, Result<Reply, NetworkError>)> {
        let targets = peers.iter().map(|p| (p.id, p.address)).collect();
        self.transport.fan_out(targets, message).await
    }

    pub async fn broadcast(&self, message: Message) -> Vec<(NodeId, Result<Reply, NetworkError>)> {
        let peers = self.membership.peers().await;
        self.multicast(&peers, message).await
    }

    /// Join the group: learn peers, ask them who leads, and run an election
    /// when nobody answers or the reported leader is lower than this node.
    pub async fn bootup(self: &Arc<Self>) -> Result<Option<ElectionOutcome>, BullyError> {
        if !self.is_alive() {
            return Err(BullyError::NotAlive(self.id));
        }

        self.refresh_membership().await;
        info!(
            "Node {} booting up with {} known peer(s)",
            self.id,
            self.membership.len().await
        );

        let announce = Message::Bootup(BootupRequest {
            src: self.id,
            address: self.address(),
        });

        let mut answered = 0usize;
        let mut reported_leader: Option<NodeId> = None;
        for (peer_id, result) in self.broadcast(announce).await {
            match result {
                Ok(Reply::Bootup(resp)) => {
                    answered += 1;
                    for peer in resp.peers {
                        self.membership.announce(peer.id, peer.address).await;
                    }
                    reported_leader = reported_leader.max(resp.leader_id);
                }
                Ok(other) => debug!("Unexpected bootup reply from {peer_id}: {other:?}"),
                Err(e) => debug!("Bootup to {peer_id} failed: {e}"),
            }
        }

        if let Some(leader) = reported_leader {
            self.replace_leader(leader).await;
        }

        let needs_election = answered == 0 || reported_leader.map_or(true, |l| l < self.id);
        if needs_election {
            info!(
                "Node {} starting election after bootup (answered={}, leader={:?})",
                self.id, answered, reported_leader
            );
            return Ok(Some(self.start_election().await));
        }

        Ok(None)
    }

    /// Administrative kill: stop answering and stop being routable. A
    /// killed leader also drops its label, since no COORDINATOR will reach
    /// it to trigger a stepdown.
    pub fn kill(&self) {
        self.alive.store(false, Ordering::Release);
        let was_leader = self.ready.swap(false, Ordering::AcqRel);
        warn!("Node {} killed", self.id);

        if was_leader {
            self.remove_label_in_background();
        }
    }

    /// Administrative revive: resume with the stale membership, forget the
    /// stale leader and rejoin.
    pub async fn revive(self: &Arc<Self>) -> Result<Option<ElectionOutcome>, BullyError> {
        self.alive.store(true, Ordering::Release);
        *self.leader_id.lock().await = None;
        info!("Node {} revived", self.id);
        self.bootup().await
    }

    /// Probe the believed leader once; any failure starts an election.
    pub async fn ping_leader(self: &Arc<Self>) -> Option<ElectionOutcome> {
        let leader = match self.leader_id().await {
            Some(leader) if leader == self.id => return None,
            Some(leader) => leader,
            None => {
                info!("Node {} has no leader; starting election", self.id);
                return Some(self.start_election().await);
            }
        };

        match self.unicast(leader, &Message::Ping).await {
            Ok(_) => None,
            Err(e) => {
                warn!("Node {} lost leader {}: {}", self.id, leader, e);
                Some(self.start_election().await)
            }
        }
    }

    pub async fn on_bootup(&self, src: NodeId, address: SocketAddr) -> BootupResponse {
        self.membership.announce(src, address).await;

        let peers: Vec<PeerInfo> = self
            .membership
            .peers()
            .await
            .into_iter()
            .map(|p| PeerInfo {
                id: p.id,
                address: p.address,
            })
            .collect();

        BootupResponse {
            leader_id: self.leader_id().await,
            node_ids: peers.iter().map(|p| p.id).collect(),
            peers,
        }
    }

    /// Acknowledge an ELECTION. Under the classic strategy a lower sender
    /// also makes this node run its own election, in the background so the
    /// caller gets its answer first.
    pub fn on_election(self: &Arc<Self>, sender: NodeId) {
        debug!("Node {} received ELECTION from {}", self.id, sender);

        if self.config.strategy != ElectionStrategy::Classic
            || sender >= self.id
            || self.election_in_flight()
        {
            return;
        }

        let node = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = node.start_election().await;
            debug!("Node {} cascaded election finished: {:?}", node.id, outcome);
        });
    }

    /// Apply a COORDINATOR announcement unconditionally.
    pub async fn on_coordinator(&self, new_leader: NodeId) {
        let previous = self.replace_leader(new_leader).await;
        info!(
            "Node {} acknowledged leader {} (was {:?})",
            self.id, new_leader, previous
        );

        if previous == Some(self.id) && new_leader != self.id {
            self.step_down();
        } else if new_leader == self.id && previous != Some(self.id) {
            self.became_leader();
        }
    }
}
