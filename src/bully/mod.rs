mod config;
mod detector;
mod election;
mod error;
mod leadership;
mod membership;
mod node;
mod state;

pub use self::config::{BullyConfig, ElectionStrategy};
pub use self::detector::FailureDetector;
pub use self::error::BullyError;
pub use self::leadership::{KubectlLabeler, LeaderLabeler, LogLabeler};
pub use self::membership::{Membership, Peer};
pub use self::node::BullyNode;
pub use self::state::{ElectionOutcome, NodeRole, NodeStatus};

use std::sync::Arc;

use log::{error, info};
use tokio::task::JoinHandle;

use crate::network::Discovery;

/// Node identifiers are unique and totally ordered; the highest live id leads.
pub type NodeId = u64;

// Main election service
pub struct Bully {
    pub node: Arc<BullyNode>,
}

impl Bully {
    pub fn new(
        config: BullyConfig,
        discovery: Arc<dyn Discovery>,
        labeler: Arc<dyn LeaderLabeler>,
    ) -> Result<Self, BullyError> {
        let node = BullyNode::new(config, discovery, labeler)?;
        Ok(Self { node })
    }

    /// Join the group and keep watching the leader.
    ///
    /// Expects the node's HTTP server to be accepting already, since peers
    /// call back during bootup.
    pub fn start(&self) -> JoinHandle<()> {
        let node = Arc::clone(&self.node);
        tokio::spawn(async move {
            match node.bootup().await {
                Ok(outcome) => info!(
                    "Node {} joined; leader={:?} election={:?}",
                    node.id(),
                    node.leader_id().await,
                    outcome
                ),
                Err(e) => error!("Node {} bootup failed: {}", node.id(), e),
            }

            FailureDetector::new(node).run().await;
        })
    }
}
