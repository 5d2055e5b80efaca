use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use log::{error, info, warn};
use tokio::process::Command;
use tokio::time::sleep;

use super::node::BullyNode;
use super::{BullyError, NodeId};

/// Marks this process as the leader for external traffic routing.
///
/// Calls are best-effort: the election outcome stands whatever they return.
#[async_trait]
pub trait LeaderLabeler: Send + Sync {
    async fn label_leader(&self, node_id: NodeId) -> Result<(), BullyError>;

    async fn remove_leader_label(&self, node_id: NodeId) -> Result<(), BullyError>;
}

/// Labeler for environments without an orchestrator.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogLabeler;

#[async_trait]
impl LeaderLabeler for LogLabeler {
    async fn label_leader(&self, node_id: NodeId) -> Result<(), BullyError> {
        info!("Node {node_id} labelled as leader");
        Ok(())
    }

    async fn remove_leader_label(&self, node_id: NodeId) -> Result<(), BullyError> {
        info!("Node {node_id} leader label removed");
        Ok(())
    }
}

/// Sets or clears a `leader=true` pod label through `kubectl`.
#[derive(Debug, Clone)]
pub struct KubectlLabeler {
    pod_name: String,
}

impl KubectlLabeler {
    pub fn new<T: Into<String>>(pod_name: T) -> Self {
        Self {
            pod_name: pod_name.into(),
        }
    }

    async fn run(&self, label: &str) -> Result<(), BullyError> {
        let output = Command::new("kubectl")
            .args(["label", "pod", &self.pod_name, label, "--overwrite"])
            .output()
            .await?;

        if output.status.success() {
            Ok(())
        } else {
            Err(BullyError::Label(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ))
        }
    }
}

#[async_trait]
impl LeaderLabeler for KubectlLabeler {
    async fn label_leader(&self, _node_id: NodeId) -> Result<(), BullyError> {
        self.run("leader=true").await
    }

    async fn remove_leader_label(&self, _node_id: NodeId) -> Result<(), BullyError> {
        self.run("leader-").await
    }
}

impl BullyNode {
    pub(super) fn became_leader(&self) {
        self.ready.store(true, Ordering::Release);
        info!("Node {} is now leader and ready", self.id);

        let labeler = Arc::clone(&self.labeler);
        let id = self.id;
        tokio::spawn(async move {
            if let Err(e) = labeler.label_leader(id).await {
                error!("Failed to label node {id} as leader: {e}");
            }
        });
    }

    pub(super) fn remove_label_in_background(&self) {
        let labeler = Arc::clone(&self.labeler);
        let id = self.id;
        tokio::spawn(async move {
            if let Err(e) = labeler.remove_leader_label(id).await {
                error!("Failed to remove leader label from node {id}: {e}");
            }
        });
    }

    /// Withdraw readiness at once, drop the label, and request a restart
    /// after the grace period so no client keeps a connection to a
    /// demoted leader.
    pub(super) fn step_down(&self) {
        self.ready.store(false, Ordering::Release);
        warn!(
            "Node {} lost leadership; restarting in {:?}",
            self.id,
            self.config.stepdown_grace()
        );

        self.remove_label_in_background();

        let id = self.id;
        let shutdown = Arc::clone(&self.shutdown);
        let grace = self.config.stepdown_grace();
        tokio::spawn(async move {
            sleep(grace).await;
            info!("Node {id} requesting restart after stepdown");
            shutdown.send_replace(true);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use crate::bully::BullyConfig;
    use crate::network::StaticDiscovery;

    #[derive(Default)]
    struct FailingLabeler {
        calls: StdMutex<Vec<&'static str>>,
    }

    #[async_trait]
    impl LeaderLabeler for FailingLabeler {
        async fn label_leader(&self, _node_id: NodeId) -> Result<(), BullyError> {
            self.calls.lock().unwrap().push("label");
            Err(BullyError::Label("forbidden".to_string()))
        }

        async fn remove_leader_label(&self, _node_id: NodeId) -> Result<(), BullyError> {
            self.calls.lock().unwrap().push("unlabel");
            Err(BullyError::Label("forbidden".to_string()))
        }
    }

    #[tokio::test]
    async fn label_failure_does_not_undo_leadership() {
        let labeler = Arc::new(FailingLabeler::default());
        let cfg = BullyConfig::new(4, SocketAddr::from(([127, 0, 0, 1], 49004)));
        let node = BullyNode::new(
            cfg,
            Arc::new(StaticDiscovery::default()),
            labeler.clone(),
        )
        .unwrap();

        node.start_election().await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(node.leader_id().await, Some(4));
        assert!(node.is_ready());
        assert_eq!(*labeler.calls.lock().unwrap(), vec!["label"]);
    }

    #[tokio::test]
    async fn killing_the_leader_removes_its_label() {
        let labeler = Arc::new(FailingLabeler::default());
        let cfg = BullyConfig::new(4, SocketAddr::from(([127, 0, 0, 1], 49024)));
        let node = BullyNode::new(
            cfg,
            Arc::new(StaticDiscovery::default()),
            labeler.clone(),
        )
        .unwrap();

        node.start_election().await;
        node.kill();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!node.is_ready());
        assert_eq!(*labeler.calls.lock().unwrap(), vec!["label", "unlabel"]);
        // A kill is not a stepdown: no restart is requested.
        assert!(!node.shutdown_requested());
    }

    #[tokio::test]
    async fn killing_a_follower_leaves_labels_alone() {
        let labeler = Arc::new(FailingLabeler::default());
        let cfg = BullyConfig::new(2, SocketAddr::from(([127, 0, 0, 1], 49034)));
        let node = BullyNode::new(
            cfg,
            Arc::new(StaticDiscovery::default()),
            labeler.clone(),
        )
        .unwrap();

        node.on_coordinator(7).await;
        node.kill();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(labeler.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn stepdown_removes_label_and_waits_for_grace() {
        let labeler = Arc::new(FailingLabeler::default());
        let mut cfg = BullyConfig::new(4, SocketAddr::from(([127, 0, 0, 1], 49014)));
        cfg.stepdown_grace = 300;
        let node = BullyNode::new(
            cfg,
            Arc::new(StaticDiscovery::default()),
            labeler.clone(),
        )
        .unwrap();

        node.on_coordinator(4).await;
        node.on_coordinator(6).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!node.is_ready());
        assert!(!node.shutdown_requested());
        assert_eq!(*labeler.calls.lock().unwrap(), vec!["label", "unlabel"]);

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(node.shutdown_requested());
    }
}
