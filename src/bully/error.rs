use thiserror::Error;

use crate::bully::NodeId;
use crate::network::NetworkError;

#[derive(Error, Debug)]
pub enum BullyError {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Unknown peer: {0}")]
    UnknownPeer(NodeId),

    #[error("Node {0} is not alive")]
    NotAlive(NodeId),

    #[error("Leader label error: {0}")]
    Label(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
