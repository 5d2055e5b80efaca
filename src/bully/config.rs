use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::NodeId;

/// Which flavour of the bully algorithm a node runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ElectionStrategy {
    /// Receivers of ELECTION start their own election and the highest live
    /// node announces itself.
    #[default]
    Classic,
    /// Receivers only acknowledge; the initiator announces the highest
    /// acknowledging candidate.
    Improved,
}

impl std::str::FromStr for ElectionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "classic" | "normal" => Ok(ElectionStrategy::Classic),
            "improved" => Ok(ElectionStrategy::Improved),
            other => Err(format!("unknown election strategy '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BullyConfig {
    pub node_id: NodeId,
    pub address: SocketAddr,
    pub strategy: ElectionStrategy,
    pub heartbeat_interval: u64, // in milliseconds
    pub heartbeat_jitter: u64,   // in milliseconds
    pub request_timeout: u64,    // in milliseconds
    pub stepdown_grace: u64,     // in milliseconds
}

impl BullyConfig {
    pub fn new(node_id: NodeId, address: SocketAddr) -> Self {
        Self {
            node_id,
            address,
            strategy: ElectionStrategy::Classic,
            heartbeat_interval: 2000,
            heartbeat_jitter: 1000,
            request_timeout: 500,
            stepdown_grace: 1000,
        }
    }

    pub fn with_strategy(mut self, strategy: ElectionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout)
    }

    pub fn stepdown_grace(&self) -> Duration {
        Duration::from_millis(self.stepdown_grace)
    }
}
