use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use log::{error, info, warn};

use bully::bully::{Bully, ElectionStrategy, KubectlLabeler, LeaderLabeler, LogLabeler};
use bully::cluster::{ClusterOptions, LocalCluster};
use bully::config::{Config, LabelCommand};
use bully::logging::init_logging;
use bully::network::{run_http_server, Discovery, DnsDiscovery, StaticDiscovery};
use bully::repl::Repl;

#[derive(Parser)]
#[command(name = "bully")]
#[command(about = "Bully leader election for a group of peer nodes")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one election node
    Node {
        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Node id (random when neither flag, file nor BULLY_NODE_ID sets it)
        #[arg(short, long)]
        id: Option<u64>,

        /// Address to serve peer traffic on
        #[arg(short, long)]
        bind: Option<SocketAddr>,

        /// Address peers use to reach this node
        #[arg(long)]
        advertise: Option<SocketAddr>,

        /// Seed peer address; repeat for more
        #[arg(short, long = "seed")]
        seeds: Vec<SocketAddr>,

        /// DNS name resolving to every peer, instead of seeds
        #[arg(long)]
        service: Option<String>,

        /// classic or improved
        #[arg(long)]
        strategy: Option<ElectionStrategy>,
    },

    /// Run an in-process cluster on loopback with an interactive shell
    Cluster {
        /// Number of nodes to start
        #[arg(short, long, default_value_t = 5)]
        nodes: usize,

        /// classic or improved
        #[arg(long, default_value = "classic")]
        strategy: ElectionStrategy,

        /// Do not run heartbeat loops; elections then only follow commands
        #[arg(long)]
        no_heartbeat: bool,
    },

    /// Admin tooling against a running node
    Admin {
        #[command(subcommand)]
        cmd: AdminCmd,
    },
}

#[derive(Subcommand)]
enum AdminCmd {
    /// Show node status
    Status {
        /// Node HTTP address, e.g. 127.0.0.1:8080
        #[arg(long)]
        http: String,
    },
    /// Stop the node from answering peers
    Kill {
        #[arg(long)]
        http: String,
    },
    /// Bring a killed node back into the group
    Revive {
        #[arg(long)]
        http: String,
    },
    /// Make the node ping its leader
    Ping {
        #[arg(long)]
        http: String,
    },
    /// Dump Prometheus metrics
    Metrics {
        #[arg(long)]
        http: String,
    },
}

async fn admin_call(method: reqwest::Method, http: &str, path: &str) -> anyhow::Result<String> {
    let url = format!("http://{http}{path}");
    let resp = reqwest::Client::new()
        .request(method, &url)
        .send()
        .await
        .with_context(|| format!("request to {url} failed"))?;
    let status = resp.status();
    let body = resp.text().await?;
    if !status.is_success() {
        anyhow::bail!("{url} answered {status}: {body}");
    }
    Ok(body)
}

#[allow(clippy::too_many_arguments)]
async fn run_node(
    config_path: Option<PathBuf>,
    id: Option<u64>,
    bind: Option<SocketAddr>,
    advertise: Option<SocketAddr>,
    seeds: Vec<SocketAddr>,
    service: Option<String>,
    strategy: Option<ElectionStrategy>,
) -> anyhow::Result<()> {
    let mut config = match config_path {
        Some(path) => Config::from_file(&path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => Config::default(),
    };
    config.apply_env()?;

    if id.is_some() {
        config.node_id = id;
    }
    if let Some(bind) = bind {
        config.bind = bind;
    }
    if advertise.is_some() {
        config.advertise = advertise;
    }
    if !seeds.is_empty() {
        config.seeds = seeds;
    }
    if service.is_some() {
        config.service = service;
    }
    if let Some(strategy) = strategy {
        config.strategy = strategy;
    }
    config.validate()?;

    let bully_config = config.to_bully_config();
    let discovery: Arc<dyn Discovery> = match &config.service {
        Some(name) => Arc::new(DnsDiscovery::new(name.clone(), config.advertised_address().port())),
        None => Arc::new(StaticDiscovery::new(config.seeds.clone())),
    };
    let labeler: Arc<dyn LeaderLabeler> = match (config.label_command, &config.pod_name) {
        (LabelCommand::Kubectl, Some(pod)) => Arc::new(KubectlLabeler::new(pod.clone())),
        _ => Arc::new(LogLabeler),
    };

    info!(
        "Starting node {} on {} ({:?} strategy)",
        bully_config.node_id, config.bind, bully_config.strategy
    );

    let bully = Bully::new(bully_config, discovery, labeler)?;
    let mut shutdown = bully.node.subscribe_shutdown();

    let http_node = Arc::clone(&bully.node);
    let bind_addr = config.bind;
    let mut server = tokio::spawn(async move { run_http_server(bind_addr, http_node).await });
    let election = bully.start();

    let result = loop {
        tokio::select! {
            res = &mut server => {
                break match res {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(anyhow::Error::new(e).context("HTTP server failed")),
                    Err(e) => Err(anyhow::Error::new(e).context("HTTP server task failed")),
                };
            }
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                if !*shutdown.borrow() {
                    continue;
                }
                if config.restart_on_stepdown {
                    info!("Stepped down; exiting so the node restarts cleanly");
                    break Ok(());
                }
                warn!("Stepped down; restart_on_stepdown is off, staying up");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break Ok(());
            }
        }
    };

    election.abort();
    server.abort();
    result
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        Command::Node {
            config,
            id,
            bind,
            advertise,
            seeds,
            service,
            strategy,
        } => {
            if let Err(e) = run_node(config, id, bind, advertise, seeds, service, strategy).await {
                error!("Node failed: {e:#}");
                return Err(e);
            }
        }
        Command::Cluster {
            nodes,
            strategy,
            no_heartbeat,
        } => {
            info!("Starting in-process cluster of {nodes} node(s)");
            let options = ClusterOptions {
                strategy,
                run_detectors: !no_heartbeat,
                ..ClusterOptions::default()
            };
            let cluster = LocalCluster::start(nodes, options).await?;
            let mut repl = Repl::new(cluster)?;
            repl.run().await;
        }
        Command::Admin { cmd } => {
            let body = match cmd {
                AdminCmd::Status { http } => admin_call(reqwest::Method::GET, &http, "/health").await?,
                AdminCmd::Metrics { http } => {
                    admin_call(reqwest::Method::GET, &http, "/metrics").await?
                }
                AdminCmd::Kill { http } => {
                    admin_call(reqwest::Method::POST, &http, "/admin/kill").await?
                }
                AdminCmd::Revive { http } => {
                    admin_call(reqwest::Method::POST, &http, "/admin/revive").await?
                }
                AdminCmd::Ping { http } => {
                    admin_call(reqwest::Method::POST, &http, "/admin/ping_leader").await?
                }
            };
            println!("{body}");
        }
    }

    Ok(())
}
