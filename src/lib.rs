pub mod bully;
pub mod cluster;
pub mod config;
pub mod logging;
pub mod network;
pub mod repl;

pub use crate::bully::{Bully, BullyConfig, BullyError, BullyNode, ElectionOutcome, ElectionStrategy, NodeId};
pub use crate::cluster::{ClusterOptions, LocalCluster};
pub use crate::config::{Config, ConfigError};
