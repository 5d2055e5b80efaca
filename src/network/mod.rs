//! HTTP transport between election peers: wire types, the outbound client,
//! peer discovery and the inbound endpoints.

mod client;
mod discovery;
mod error;
mod metrics;
mod protocol;
pub mod server;

pub use self::client::Transport;
pub use self::discovery::{Discovery, DnsDiscovery, StaticDiscovery};
pub use self::error::NetworkError;
pub use self::metrics::{CounterSnapshot, MessageCounters};
pub use self::protocol::{
    BootupRequest, BootupResponse, CoordinatorRequest, ElectionRequest, Message, MessageKind,
    PeerInfo, Reply, StatusReply,
};
pub use self::server::{run_http_server, serve_listener};
