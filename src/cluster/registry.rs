//! Node Registry
//!
//! Tracks cluster members and their live health flags. The topology is
//! fixed at configuration time; health is mutated by failover in one
//! session and read by the selector in every other, so it sits behind a
//! shared lock.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::config::ClusterConfig;
use crate::error::{Error, Result};

/// Role of a node in the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    /// The single member all writes are routed to
    Primary,
    /// A member used for load-balanced reads
    Secondary,
}

impl Default for NodeRole {
    fn default() -> Self {
        NodeRole::Secondary
    }
}

impl std::fmt::Display for NodeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeRole::Primary => write!(f, "PRIMARY"),
            NodeRole::Secondary => write!(f, "SECONDARY"),
        }
    }
}

/// Live health of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeHealth {
    /// Node is usable
    Healthy,
    /// Node timed out a sync wait; temporarily deprioritized, not failed
    Suspected,
    /// Node dropped connectivity
    Failed,
}

impl std::fmt::Display for NodeHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeHealth::Healthy => write!(f, "HEALTHY"),
            NodeHealth::Suspected => write!(f, "SUSPECTED"),
            NodeHealth::Failed => write!(f, "FAILED"),
        }
    }
}

/// A cluster member with fully resolved connection parameters
#[derive(Debug, Clone)]
pub struct Node {
    /// Unique node name
    pub name: String,
    /// Node host
    pub host: String,
    /// Node port
    pub port: u16,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Database name (optional)
    pub database: Option<String>,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Node role
    pub role: NodeRole,
    /// Preferred for reads
    pub preferred: bool,
}

struct HealthEntry {
    health: NodeHealth,
    marked_at: Option<Instant>,
}

/// Shared registry of cluster members and their health
pub struct NodeRegistry {
    nodes: Vec<Node>,
    primary_index: usize,
    health: RwLock<HashMap<String, HealthEntry>>,
    retry_interval: Duration,
}

impl NodeRegistry {
    /// Build a registry from configuration, resolving per-node overrides
    /// against the shared defaults
    pub fn from_config(cluster: &ClusterConfig) -> Result<Self> {
        let defaults = &cluster.defaults;
        let mut nodes = Vec::with_capacity(cluster.nodes.len());
        let mut health = HashMap::new();

        for spec in &cluster.nodes {
            let preferred = spec.preferred
                || cluster
                    .preferred_host
                    .as_deref()
                    .map(|h| h == spec.host)
                    .unwrap_or(false);
            let node = Node {
                name: spec.name.clone(),
                host: spec.host.clone(),
                port: spec.port.unwrap_or(defaults.port),
                user: spec.user.clone().unwrap_or_else(|| defaults.user.clone()),
                password: spec
                    .password
                    .clone()
                    .unwrap_or_else(|| defaults.password.clone()),
                database: spec.database.clone().or_else(|| defaults.database.clone()),
                connect_timeout: Duration::from_secs(
                    spec.connect_timeout_secs
                        .unwrap_or(defaults.connect_timeout_secs),
                ),
                role: spec.role,
                preferred,
            };
            health.insert(
                node.name.clone(),
                HealthEntry {
                    health: NodeHealth::Healthy,
                    marked_at: None,
                },
            );
            nodes.push(node);
        }

        let primary_index = nodes
            .iter()
            .position(|n| n.role == NodeRole::Primary)
            .ok_or_else(|| Error::Config("cluster has no primary node".into()))?;

        Ok(Self {
            nodes,
            primary_index,
            health: RwLock::new(health),
            retry_interval: cluster.retry_interval(),
        })
    }

    /// The single primary node
    pub fn primary(&self) -> &Node {
        &self.nodes[self.primary_index]
    }

    /// All nodes, in configuration order
    pub fn all(&self) -> &[Node] {
        &self.nodes
    }

    /// All secondary nodes
    pub fn secondaries(&self) -> Vec<&Node> {
        self.nodes
            .iter()
            .filter(|n| n.role == NodeRole::Secondary)
            .collect()
    }

    /// Look up a node by name
    pub fn get(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// Current health of a node
    pub async fn health_of(&self, name: &str) -> Result<NodeHealth> {
        let health = self.health.read().await;
        health
            .get(name)
            .map(|e| e.health)
            .ok_or_else(|| Error::NodeNotFound(name.to_string()))
    }

    /// Mark a node failed after a connectivity fault
    pub async fn mark_failed(&self, name: &str) {
        self.mark(name, NodeHealth::Failed).await;
    }

    /// Mark a node suspected after a sync-wait timeout. Lag is not the
    /// same as a hard failure, so the node is only deprioritized.
    pub async fn mark_suspected(&self, name: &str) {
        self.mark(name, NodeHealth::Suspected).await;
    }

    /// Mark a node healthy again after a successful connect
    pub async fn mark_healthy(&self, name: &str) {
        let mut health = self.health.write().await;
        if let Some(entry) = health.get_mut(name) {
            if entry.health != NodeHealth::Healthy {
                tracing::info!(node = name, "node recovered");
            }
            entry.health = NodeHealth::Healthy;
            entry.marked_at = None;
        }
    }

    async fn mark(&self, name: &str, state: NodeHealth) {
        let mut health = self.health.write().await;
        if let Some(entry) = health.get_mut(name) {
            tracing::warn!(node = name, state = %state, "node health changed");
            entry.health = state;
            entry.marked_at = Some(Instant::now());
        }
    }

    /// Whether a node may currently be selected. A failed or suspected
    /// node becomes a candidate again once the retry interval has passed,
    /// so health can recover without external intervention.
    pub async fn is_candidate(&self, name: &str) -> bool {
        let health = self.health.read().await;
        match health.get(name) {
            Some(entry) => match entry.health {
                NodeHealth::Healthy => true,
                NodeHealth::Suspected | NodeHealth::Failed => entry
                    .marked_at
                    .map(|t| t.elapsed() >= self.retry_interval)
                    .unwrap_or(true),
            },
            None => false,
        }
    }

    /// Secondaries that may currently be selected for reads
    pub async fn candidate_secondaries(&self) -> Vec<Node> {
        let mut out = Vec::new();
        for node in self.secondaries() {
            if self.is_candidate(&node.name).await {
                out.push(node.clone());
            }
        }
        out
    }

    /// Per-node health report, for status output
    pub async fn report(&self) -> Vec<NodeReport> {
        let health = self.health.read().await;
        self.nodes
            .iter()
            .map(|n| NodeReport {
                name: n.name.clone(),
                host: n.host.clone(),
                port: n.port,
                role: n.role,
                health: health
                    .get(&n.name)
                    .map(|e| e.health)
                    .unwrap_or(NodeHealth::Healthy),
                preferred: n.preferred,
            })
            .collect()
    }
}

/// Snapshot of one node's state
#[derive(Debug, Clone, Serialize)]
pub struct NodeReport {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub role: NodeRole,
    pub health: NodeHealth,
    pub preferred: bool,
}
