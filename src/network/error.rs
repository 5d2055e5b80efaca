use thiserror::Error;

use crate::bully::NodeId;

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Timeout error")]
    Timeout,

    #[error("Peer answered with status {0}")]
    Status(u16),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Refusing to send a message to self (node {0})")]
    SelfAddressed(NodeId),
}

impl From<reqwest::Error> for NetworkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            NetworkError::Timeout
        } else if let Some(status) = err.status() {
            NetworkError::Status(status.as_u16())
        } else if err.is_decode() {
            NetworkError::Decode(err.to_string())
        } else {
            NetworkError::Connection(err.to_string())
        }
    }
}
