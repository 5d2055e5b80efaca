use std::net::SocketAddr;

use async_trait::async_trait;
use log::warn;
use tokio::net::lookup_host;
use tokio::sync::RwLock;

/// Source of candidate peer addresses.
///
/// Implementations only report where peers might be; the membership table
/// decides who actually answers.
#[async_trait]
pub trait Discovery: Send + Sync {
    async fn discover(&self) -> Vec<SocketAddr>;
}

/// A fixed, extendable seed list.
#[derive(Debug, Default)]
pub struct StaticDiscovery {
    seeds: RwLock<Vec<SocketAddr>>,
}

impl StaticDiscovery {
    pub fn new(seeds: Vec<SocketAddr>) -> Self {
        let mut unique = Vec::with_capacity(seeds.len());
        for seed in seeds {
            if !unique.contains(&seed) {
                unique.push(seed);
            }
        }
        Self {
            seeds: RwLock::new(unique),
        }
    }

    pub async fn add(&self, addr: SocketAddr) {
        let mut seeds = self.seeds.write().await;
        if !seeds.contains(&addr) {
            seeds.push(addr);
        }
    }
}

#[async_trait]
impl Discovery for StaticDiscovery {
    async fn discover(&self) -> Vec<SocketAddr> {
        self.seeds.read().await.clone()
    }
}

/// Resolves a service name (e.g. a headless service) to every address
/// behind it, all sharing one port.
#[derive(Debug, Clone)]
pub struct DnsDiscovery {
    service: String,
    port: u16,
}

impl DnsDiscovery {
    pub fn new<T: Into<String>>(service: T, port: u16) -> Self {
        Self {
            service: service.into(),
            port,
        }
    }
}

#[async_trait]
impl Discovery for DnsDiscovery {
    async fn discover(&self) -> Vec<SocketAddr> {
        match lookup_host((self.service.as_str(), self.port)).await {
            Ok(addrs) => {
                let mut unique: Vec<SocketAddr> = Vec::new();
                for addr in addrs {
                    if !unique.contains(&addr) {
                        unique.push(addr);
                    }
                }
                unique
            }
            Err(e) => {
                warn!("DNS lookup for '{}' failed: {}", self.service, e);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_discovery_deduplicates_seeds() {
        let a: SocketAddr = "127.0.0.1:5001".parse().unwrap();
        let b: SocketAddr = "127.0.0.1:5002".parse().unwrap();
        let discovery = StaticDiscovery::new(vec![a, a, b]);
        discovery.add(b).await;

        assert_eq!(discovery.discover().await, vec![a, b]);
    }

    #[tokio::test]
    async fn dns_discovery_resolves_localhost() {
        let discovery = DnsDiscovery::new("localhost", 5100);
        let addrs = discovery.discover().await;
        assert!(!addrs.is_empty());
        assert!(addrs.iter().all(|a| a.port() == 5100));
    }
}
