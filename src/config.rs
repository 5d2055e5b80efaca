use std::net::SocketAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bully::{BullyConfig, ElectionStrategy, NodeId};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// How the node advertises leadership to its environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LabelCommand {
    #[default]
    None,
    Kubectl,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Random when absent.
    pub node_id: Option<NodeId>,
    pub bind: SocketAddr,
    /// Address peers should use to reach this node, when it differs from
    /// `bind` (e.g. binding 0.0.0.0).
    pub advertise: Option<SocketAddr>,
    pub seeds: Vec<SocketAddr>,
    pub service: Option<String>,
    pub heartbeat_interval_ms: u64,
    pub heartbeat_jitter_ms: u64,
    pub request_timeout_ms: u64,
    pub stepdown_grace_ms: u64,
    pub strategy: ElectionStrategy,
    pub restart_on_stepdown: bool,
    pub pod_name: Option<String>,
    pub label_command: LabelCommand,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_id: None,
            bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
            advertise: None,
            seeds: vec![],
            service: None,
            heartbeat_interval_ms: 2000,
            heartbeat_jitter_ms: 1000,
            request_timeout_ms: 500,
            stepdown_grace_ms: 1000,
            strategy: ElectionStrategy::Classic,
            restart_on_stepdown: true,
            pod_name: None,
            label_command: LabelCommand::None,
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::Parse(format!("{name}={raw}: {e}")))
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Apply `BULLY_*` and `POD_NAME` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_vars(|name| std::env::var(name).ok())
    }

    fn apply_vars<F>(&mut self, get: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = get("BULLY_NODE_ID") {
            self.node_id = Some(parse_env("BULLY_NODE_ID", &v)?);
        }
        if let Some(v) = get("BULLY_BIND") {
            self.bind = parse_env("BULLY_BIND", &v)?;
        }
        if let Some(v) = get("BULLY_SEEDS") {
            self.seeds = v
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(|s| parse_env("BULLY_SEEDS", s))
                .collect::<Result<_, _>>()?;
        }
        if let Some(v) = get("BULLY_SERVICE") {
            self.service = Some(v);
        }
        if let Some(v) = get("BULLY_STRATEGY") {
            self.strategy = v.parse().map_err(ConfigError::Parse)?;
        }
        if let Some(v) = get("POD_NAME") {
            self.pod_name = Some(v);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bind.port() == 0 && self.advertise.is_none() {
            return Err(ConfigError::Invalid(
                "bind port 0 needs an explicit advertise address".to_string(),
            ));
        }
        if !(500..=2000).contains(&self.request_timeout_ms) {
            return Err(ConfigError::Invalid(format!(
                "request_timeout_ms must be within 500..=2000, got {}",
                self.request_timeout_ms
            )));
        }
        if self.heartbeat_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "heartbeat_interval_ms must be positive".to_string(),
            ));
        }
        if self.label_command == LabelCommand::Kubectl && self.pod_name.is_none() {
            return Err(ConfigError::Invalid(
                "kubectl labelling needs pod_name (or POD_NAME)".to_string(),
            ));
        }
        Ok(())
    }

    /// Address peers reach this node on.
    pub fn advertised_address(&self) -> SocketAddr {
        self.advertise.unwrap_or(self.bind)
    }

    pub fn to_bully_config(&self) -> BullyConfig {
        let node_id = self.node_id.unwrap_or_else(|| rand::random::<u32>() as NodeId);

        let mut cfg = BullyConfig::new(node_id, self.advertised_address()).with_strategy(self.strategy);
        cfg.heartbeat_interval = self.heartbeat_interval_ms;
        cfg.heartbeat_jitter = self.heartbeat_jitter_ms;
        cfg.request_timeout = self.request_timeout_ms;
        cfg.stepdown_grace = self.stepdown_grace_ms;
        cfg
    }
}
