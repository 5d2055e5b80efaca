use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::body::HttpBody as _;
use hyper::server::conn::AddrIncoming;
use hyper::service::{make_service_fn, service_fn};
use hyper::{header, Body, Method, Request, Response, StatusCode};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::protocol::{BootupRequest, CoordinatorRequest, ElectionRequest, MessageKind, StatusReply};
use crate::bully::{BullyNode, NodeRole};

const MAX_BODY_BYTES: usize = 64 * 1024;

/// Bind `addr` and serve the node's endpoints until the server fails.
pub async fn run_http_server(addr: SocketAddr, node: Arc<BullyNode>) -> Result<(), hyper::Error> {
    serve(hyper::Server::try_bind(&addr)?, node).await
}

/// Serve the node's endpoints on an already bound listener.
pub async fn serve_listener(
    listener: std::net::TcpListener,
    node: Arc<BullyNode>,
) -> Result<(), hyper::Error> {
    serve(hyper::Server::from_tcp(listener)?, node).await
}

async fn serve(
    builder: hyper::server::Builder<AddrIncoming>,
    node: Arc<BullyNode>,
) -> Result<(), hyper::Error> {
    let make_svc = make_service_fn(move |_conn| {
        let node = Arc::clone(&node);
        async move {
            Ok::<_, Infallible>(service_fn(move |req| {
                let node = Arc::clone(&node);
                async move { handle(req, node).await }
            }))
        }
    });

    builder.serve(make_svc).await
}

fn internal_error() -> Response<Body> {
    let mut resp = Response::new(Body::from("{\"error\":\"internal error\"}"));
    *resp.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    resp
}

fn json_response<T: Serialize>(status: u16, body: &T) -> Response<Body> {
    let bytes = match serde_json::to_vec(body) {
        Ok(bytes) => bytes,
        Err(_) => return internal_error(),
    };
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(bytes))
        .unwrap_or_else(|_| internal_error())
}

fn status_response(status: u16, text: &str) -> Response<Body> {
    json_response(status, &StatusReply::new(text))
}

fn json_error(status: u16, msg: &str) -> Response<Body> {
    json_response(status, &serde_json::json!({ "error": msg }))
}

enum ReadBodyError {
    TooLarge,
    Hyper(hyper::Error),
}

impl From<hyper::Error> for ReadBodyError {
    fn from(e: hyper::Error) -> Self {
        Self::Hyper(e)
    }
}

async fn read_body_limited(mut body: Body, max_bytes: usize) -> Result<Vec<u8>, ReadBodyError> {
    let mut out = Vec::new();
    while let Some(next) = body.data().await {
        let chunk = next?;
        if out.len() + chunk.len() > max_bytes {
            return Err(ReadBodyError::TooLarge);
        }
        out.extend_from_slice(&chunk);
    }
    Ok(out)
}

/// Read and decode a JSON body, or produce the error response to send back.
async fn read_json<T: DeserializeOwned>(req: Request<Body>) -> Result<T, Response<Body>> {
    let bytes = match read_body_limited(req.into_body(), MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(ReadBodyError::TooLarge) => return Err(json_error(413, "payload too large")),
        Err(ReadBodyError::Hyper(e)) => {
            return Err(json_error(400, &format!("failed to read request body: {e}")))
        }
    };
    serde_json::from_slice(&bytes).map_err(|e| json_error(400, &format!("invalid JSON: {e}")))
}

pub(crate) async fn handle(
    req: Request<Body>,
    node: Arc<BullyNode>,
) -> Result<Response<Body>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    node.counters().record_inbound();
    debug!("Node {} <- {} {}", node.id(), method, path);

    if !path.starts_with("/admin/") && !node.is_alive() {
        return Ok(status_response(401, "Not alive"));
    }

    let response = match (method, path.as_str()) {
        (Method::GET, "/ping") => status_response(200, "Alive"),
        (Method::GET, "/pod_id") => json_response(200, &node.id()),
        (Method::POST, "/bootup") => match read_json::<BootupRequest>(req).await {
            Ok(msg) => json_response(200, &node.on_bootup(msg.src, msg.address).await),
            Err(resp) => resp,
        },
        (Method::GET, "/election") | (Method::POST, "/election") => {
            match read_json::<ElectionRequest>(req).await {
                Ok(msg) if msg.kind == MessageKind::Election => {
                    node.on_election(msg.src);
                    status_response(200, "OK")
                }
                Ok(msg) => {
                    warn!("Node {} rejected {} sent to /election", node.id(), msg.kind);
                    json_error(400, "unexpected message type")
                }
                Err(resp) => resp,
            }
        }
        (Method::PUT, "/coordinator") => match read_json::<CoordinatorRequest>(req).await {
            Ok(msg) => {
                node.on_coordinator(msg.leader_id).await;
                status_response(200, "Acknowledged")
            }
            Err(resp) => resp,
        },
        (Method::GET, "/readiness") => {
            if node.is_ready() {
                status_response(200, "Ready")
            } else {
                status_response(503, "Not ready")
            }
        }
        (Method::GET, "/health") => json_response(200, &node.status().await),
        (Method::GET, "/metrics") => Response::builder()
            .status(200)
            .header(header::CONTENT_TYPE, "text/plain; version=0.0.4")
            .body(Body::from(build_metrics(&node).await))
            .unwrap_or_else(|_| internal_error()),
        (Method::POST, "/admin/kill") => {
            node.kill();
            status_response(200, "Killed")
        }
        (Method::POST, "/admin/revive") => match node.revive().await {
            Ok(_) => json_response(200, &node.status().await),
            Err(e) => json_error(500, &e.to_string()),
        },
        (Method::POST, "/admin/ping_leader") => {
            let outcome = node.ping_leader().await;
            json_response(
                200,
                &serde_json::json!({
                    "election": outcome.map(|o| format!("{o:?}")),
                    "leader_id": node.leader_id().await,
                }),
            )
        }
        _ => json_error(404, "not found"),
    };

    Ok(response)
}

async fn build_metrics(node: &BullyNode) -> String {
    let counts = node.counters().snapshot();
    let status = node.status().await;
    let role_value = match status.role {
        NodeRole::Follower => 0,
        NodeRole::Candidate => 1,
        NodeRole::Leader => 2,
    };

    format!(
        concat!(
            "# TYPE bully_messages_sent_total counter\n",
            "bully_messages_sent_total{{kind=\"election\"}} {}\n",
            "bully_messages_sent_total{{kind=\"coordinator\"}} {}\n",
            "bully_messages_sent_total{{kind=\"ping\"}} {}\n",
            "bully_messages_sent_total{{kind=\"bootup\"}} {}\n",
            "bully_messages_sent_total{{kind=\"id_query\"}} {}\n",
            "# TYPE bully_requests_received_total counter\n",
            "bully_requests_received_total {}\n",
            "# TYPE bully_leader_id gauge\n",
            "bully_leader_id {}\n",
            "# TYPE bully_role gauge\n",
            "bully_role {}\n",
            "# TYPE bully_alive gauge\n",
            "bully_alive {}\n",
            "# TYPE bully_ready gauge\n",
            "bully_ready {}\n",
            "# TYPE bully_election_in_flight gauge\n",
            "bully_election_in_flight {}\n",
            "# TYPE bully_known_peers gauge\n",
            "bully_known_peers {}\n",
        ),
        counts.election,
        counts.coordinator,
        counts.ping,
        counts.bootup,
        counts.id_query,
        counts.inbound,
        status.leader_id.map_or(-1, |id| id as i128),
        role_value,
        status.alive as u8,
        status.ready as u8,
        status.election_in_flight as u8,
        status.peers.len(),
    )
}
