use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use tokio::task::JoinSet;

use crate::bully::NodeId;

use super::metrics::MessageCounters;
use super::protocol::{BootupResponse, Message, Reply, StatusReply};
use super::NetworkError;

/// Single-attempt HTTP messaging to peers.
///
/// Every call carries its own timeout. Failures are returned per call and
/// are never retried here.
#[derive(Clone)]
pub struct Transport {
    self_id: NodeId,
    self_addr: SocketAddr,
    timeout: Duration,
    http: reqwest::Client,
    counters: Arc<MessageCounters>,
}

impl Transport {
    pub fn new(
        self_id: NodeId,
        self_addr: SocketAddr,
        timeout: Duration,
        counters: Arc<MessageCounters>,
    ) -> Result<Self, NetworkError> {
        let http = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|e| NetworkError::Connection(e.to_string()))?;

        Ok(Self {
            self_id,
            self_addr,
            timeout,
            http,
            counters,
        })
    }

    /// Send `message` to the peer `dst` listening on `addr`.
    pub async fn unicast(
        &self,
        dst: NodeId,
        addr: SocketAddr,
        message: &Message,
    ) -> Result<Reply, NetworkError> {
        if dst == self.self_id {
            return Err(NetworkError::SelfAddressed(dst));
        }
        self.send_to_addr(addr, message).await
    }

    /// Send `message` to an address whose node id may not be known yet.
    pub async fn send_to_addr(
        &self,
        addr: SocketAddr,
        message: &Message,
    ) -> Result<Reply, NetworkError> {
        if addr == self.self_addr {
            return Err(NetworkError::SelfAddressed(self.self_id));
        }

        self.counters.record_outbound(message.kind());
        debug!(
            "Node {} sending {} to {}",
            self.self_id,
            message.kind(),
            addr
        );

        let url = format!("http://{}{}", addr, message.path());
        let request = match message {
            Message::Ping | Message::QueryId => self.http.get(url),
            Message::Bootup(body) => self.http.post(url).json(body),
            Message::Election(body) => self.http.post(url).json(body),
            Message::Coordinator(body) => self.http.put(url).json(body),
        };

        let response = request.timeout(self.timeout).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NetworkError::Status(status.as_u16()));
        }

        let reply = match message {
            Message::Ping => {
                response.json::<StatusReply>().await?;
                Reply::Alive
            }
            Message::QueryId => Reply::Id(response.json::<NodeId>().await?),
            Message::Bootup(_) => Reply::Bootup(response.json::<BootupResponse>().await?),
            Message::Election(_) => Reply::Ack,
            Message::Coordinator(_) => Reply::Acknowledged,
        };

        Ok(reply)
    }

    /// Send `message` to every target concurrently and wait for all of them.
    ///
    /// Targets naming this node are skipped. The result holds one entry per
    /// remaining target, in completion order.
    pub async fn fan_out(
        &self,
        targets: Vec<(NodeId, SocketAddr)>,
        message: Message,
    ) -> Vec<(NodeId, Result<Reply, NetworkError>)> {
        let mut calls = JoinSet::new();

        for (id, addr) in targets {
            if id == self.self_id {
                continue;
            }
            let transport = self.clone();
            let message = message.clone();
            calls.spawn(async move { (id, transport.unicast(id, addr, &message).await) });
        }

        let mut results = Vec::with_capacity(calls.len());
        while let Some(joined) = calls.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => debug!("Fan-out call aborted: {e}"),
            }
        }
        results
    }

    /// Ask every address for its node id concurrently.
    pub async fn query_ids(
        &self,
        addrs: Vec<SocketAddr>,
    ) -> Vec<(SocketAddr, Result<NodeId, NetworkError>)> {
        let mut calls = JoinSet::new();

        for addr in addrs {
            if addr == self.self_addr {
                continue;
            }
            let transport = self.clone();
            calls.spawn(async move {
                let id = match transport.send_to_addr(addr, &Message::QueryId).await {
                    Ok(Reply::Id(id)) => Ok(id),
                    Ok(other) => Err(NetworkError::Decode(format!(
                        "unexpected reply to id query: {other:?}"
                    ))),
                    Err(e) => Err(e),
                };
                (addr, id)
            });
        }

        let mut results = Vec::with_capacity(calls.len());
        while let Some(joined) = calls.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => debug!("Id query aborted: {e}"),
            }
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport(id: NodeId, port: u16) -> Transport {
        Transport::new(
            id,
            SocketAddr::from(([127, 0, 0, 1], port)),
            Duration::from_millis(500),
            Arc::new(MessageCounters::default()),
        )
        .expect("transport")
    }

    #[tokio::test]
    async fn unicast_to_self_is_rejected_before_sending() {
        let t = transport(3, 45001);
        let err = t
            .unicast(3, "127.0.0.1:45002".parse().unwrap(), &Message::Ping)
            .await
            .unwrap_err();
        assert!(matches!(err, NetworkError::SelfAddressed(3)));
        assert_eq!(t.counters.snapshot().outbound(), 0);
    }

    #[tokio::test]
    async fn fan_out_skips_self_and_reports_each_failure() {
        let t = transport(1, 45011);
        // Nothing listens on these ports; each call fails on its own.
        let targets = vec![
            (1, "127.0.0.1:45011".parse().unwrap()),
            (2, "127.0.0.1:1".parse().unwrap()),
            (3, "127.0.0.1:2".parse().unwrap()),
        ];

        let mut results = t.fan_out(targets, Message::Ping).await;
        results.sort_by_key(|(id, _)| *id);

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, 2);
        assert_eq!(results[1].0, 3);
        assert!(results.iter().all(|(_, r)| r.is_err()));
        assert_eq!(t.counters.snapshot().ping, 2);
    }
}
