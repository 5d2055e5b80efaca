//! An in-process group of election nodes on loopback, for the `cluster`
//! command and the integration tests.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context};
use log::{error, info};
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::bully::{
    BullyConfig, BullyNode, ElectionOutcome, ElectionStrategy, FailureDetector, LogLabeler, NodeId,
    NodeStatus,
};
use crate::network::{serve_listener, StaticDiscovery};

#[derive(Debug, Clone)]
pub struct ClusterOptions {
    pub strategy: ElectionStrategy,
    /// Run each node's heartbeat loop. Off by default so tests drive
    /// elections explicitly.
    pub run_detectors: bool,
    pub heartbeat_interval: u64,
    pub heartbeat_jitter: u64,
    pub request_timeout: u64,
    pub stepdown_grace: u64,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            strategy: ElectionStrategy::Classic,
            run_detectors: false,
            heartbeat_interval: 2000,
            heartbeat_jitter: 1000,
            request_timeout: 500,
            stepdown_grace: 1000,
        }
    }
}

pub struct LocalCluster {
    options: ClusterOptions,
    discovery: Arc<StaticDiscovery>,
    nodes: BTreeMap<NodeId, Arc<BullyNode>>,
    tasks: Vec<JoinHandle<()>>,
}

impl LocalCluster {
    /// Start nodes `1..=size`, one after another.
    pub async fn start(size: usize, options: ClusterOptions) -> anyhow::Result<Self> {
        let ids: Vec<NodeId> = (1..=size as NodeId).collect();
        Self::with_ids(&ids, options).await
    }

    /// Start one node per id, in the given order.
    pub async fn with_ids(ids: &[NodeId], options: ClusterOptions) -> anyhow::Result<Self> {
        let mut cluster = Self {
            options,
            discovery: Arc::new(StaticDiscovery::default()),
            nodes: BTreeMap::new(),
            tasks: Vec::new(),
        };
        for &id in ids {
            cluster.spawn_node(id).await?;
        }
        Ok(cluster)
    }

    /// Add a node with the next free id and let it join.
    pub async fn add_node(&mut self) -> anyhow::Result<NodeId> {
        let id = self.nodes.keys().max().map_or(1, |max| max + 1);
        self.spawn_node(id).await?;
        Ok(id)
    }

    async fn spawn_node(&mut self, id: NodeId) -> anyhow::Result<()> {
        if self.nodes.contains_key(&id) {
            return Err(anyhow!("node {id} already exists"));
        }

        let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;

        let mut config = BullyConfig::new(id, addr).with_strategy(self.options.strategy);
        config.heartbeat_interval = self.options.heartbeat_interval;
        config.heartbeat_jitter = self.options.heartbeat_jitter;
        config.request_timeout = self.options.request_timeout;
        config.stepdown_grace = self.options.stepdown_grace;

        let node = BullyNode::new(config, self.discovery.clone(), Arc::new(LogLabeler))?;
        self.discovery.add(addr).await;

        let server_node = Arc::clone(&node);
        self.tasks.push(tokio::spawn(async move {
            if let Err(e) = serve_listener(listener, server_node).await {
                error!("HTTP server for node {id} stopped: {e}");
            }
        }));
        self.nodes.insert(id, Arc::clone(&node));
        info!("Cluster node {id} listening on {addr}");

        node.bootup()
            .await
            .with_context(|| format!("node {id} failed to boot"))?;

        if self.options.run_detectors {
            self.tasks
                .push(tokio::spawn(FailureDetector::new(node).run()));
        }
        Ok(())
    }

    pub fn node(&self, id: NodeId) -> Option<Arc<BullyNode>> {
        self.nodes.get(&id).cloned()
    }

    fn require(&self, id: NodeId) -> anyhow::Result<&Arc<BullyNode>> {
        self.nodes
            .get(&id)
            .ok_or_else(|| anyhow!("no node with id {id}"))
    }

    pub fn ids(&self) -> Vec<NodeId> {
        self.nodes.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn kill(&self, id: NodeId) -> anyhow::Result<()> {
        self.require(id)?.kill();
        Ok(())
    }

    pub async fn revive(&self, id: NodeId) -> anyhow::Result<Option<ElectionOutcome>> {
        Ok(self.require(id)?.revive().await?)
    }

    pub async fn ping_leader(&self, id: NodeId) -> anyhow::Result<Option<ElectionOutcome>> {
        Ok(self.require(id)?.ping_leader().await)
    }

    /// Outbound messages sent by every node since the last reset.
    pub fn message_count(&self) -> u64 {
        self.nodes
            .values()
            .map(|n| n.counters().snapshot().outbound())
            .sum()
    }

    pub fn reset_message_counts(&self) {
        for node in self.nodes.values() {
            node.counters().reset();
        }
    }

    pub async fn summary(&self) -> Vec<NodeStatus> {
        let mut out = Vec::with_capacity(self.nodes.len());
        for node in self.nodes.values() {
            out.push(node.status().await);
        }
        out
    }

    /// Believed leader of every alive node.
    pub async fn leaders(&self) -> BTreeMap<NodeId, Option<NodeId>> {
        let mut out = BTreeMap::new();
        for (id, node) in &self.nodes {
            if node.is_alive() {
                out.insert(*id, node.leader_id().await);
            }
        }
        out
    }

    /// Poll until every alive node believes `expected` leads, or give up
    /// after `timeout`.
    pub async fn wait_for_leader(&self, expected: NodeId, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let leaders = self.leaders().await;
            if !leaders.is_empty() && leaders.values().all(|l| *l == Some(expected)) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            sleep(Duration::from_millis(20)).await;
        }
    }
}

impl Drop for LocalCluster {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn nodes_get_consecutive_ids() {
        let mut cluster = LocalCluster::start(2, ClusterOptions::default())
            .await
            .unwrap();
        assert_eq!(cluster.ids(), vec![1, 2]);

        assert_eq!(cluster.add_node().await.unwrap(), 3);
        assert_eq!(cluster.len(), 3);
        assert!(cluster.kill(9).is_err());
    }

    #[tokio::test]
    async fn duplicate_id_is_rejected() {
        assert!(LocalCluster::with_ids(&[4, 4], ClusterOptions::default())
            .await
            .is_err());
    }
}
