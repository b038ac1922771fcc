//! Galerouter Configuration
//!
//! Configuration structures for the router: cluster topology with
//! per-node connection parameters inheriting from shared defaults, the
//! failover policy, and logging.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::cluster::NodeRole;

/// Main galerouter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Cluster topology
    pub cluster: ClusterConfig,

    /// Failover and routing policy
    #[serde(default)]
    pub policy: FailoverPolicy,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Cluster topology configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Shared connection defaults, overridable per node
    #[serde(default)]
    pub defaults: ConnectionDefaults,

    /// Cluster members (exactly one must have role = "primary")
    pub nodes: Vec<NodeConfig>,

    /// Host the router runs next to; a secondary on this host is
    /// preferred for reads
    #[serde(default)]
    pub preferred_host: Option<String>,

    /// Seconds before a failed or suspected node becomes a selection
    /// candidate again
    #[serde(default = "default_retry_interval_secs")]
    pub retry_interval_secs: u64,
}

/// Shared connection defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionDefaults {
    /// MariaDB port
    #[serde(default = "default_db_port")]
    pub port: u16,

    /// Database user
    #[serde(default)]
    pub user: String,

    /// Database password
    #[serde(default)]
    pub password: String,

    /// Database name (optional)
    #[serde(default)]
    pub database: Option<String>,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

/// Per-node configuration; unset fields inherit from [`ConnectionDefaults`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Unique node name
    pub name: String,

    /// Node host
    pub host: String,

    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default)]
    pub user: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default)]
    pub database: Option<String>,

    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,

    /// Node role (default: secondary)
    #[serde(default)]
    pub role: NodeRole,

    /// Prefer this node for reads regardless of `preferred_host`
    #[serde(default)]
    pub preferred: bool,
}

/// Failover and routing policy
///
/// Every option here is reconfigurable on a live router: the router holds
/// this struct behind a shared lock and re-reads it per statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailoverPolicy {
    /// Enable failover-and-replay on connectivity faults
    #[serde(default = "default_true")]
    pub failover_enable: bool,

    /// Maximum statements recorded per transaction before replay is
    /// disabled for that transaction
    #[serde(default = "default_history_limit")]
    pub failover_history_limit: usize,

    /// Start transactions on a secondary and promote on first write
    #[serde(default = "default_true")]
    pub optimistic_transactions: bool,

    /// Backoff before reconnecting after a connectivity fault
    #[serde(default = "default_reconnect_wait_ms")]
    pub reconnect_wait_time_ms: u64,

    /// Block secondary reads after a write until the secondary has
    /// applied replication
    #[serde(default = "default_true")]
    pub wsrep_sync_after_write: bool,

    /// Upper bound on a single sync wait
    #[serde(default = "default_sync_timeout_ms")]
    pub wsrep_sync_timeout_ms: u64,

    /// Use a GTID position wait instead of the generic sync-wait facility
    #[serde(default)]
    pub wsrep_sync_use_gtid: bool,

    /// Advertise to the SQL layer that UPDATE cannot select from the
    /// table it updates; carried for collaborators, not acted on here
    #[serde(default)]
    pub disable_update_can_self_select: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (pretty, json)
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log to file path (optional)
    pub file: Option<PathBuf>,
}

// Default value functions
fn default_db_port() -> u16 {
    3306
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_retry_interval_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_history_limit() -> usize {
    1000
}

fn default_reconnect_wait_ms() -> u64 {
    500
}

fn default_sync_timeout_ms() -> u64 {
    5000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for ConnectionDefaults {
    fn default() -> Self {
        Self {
            port: default_db_port(),
            user: String::new(),
            password: String::new(),
            database: None,
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl Default for FailoverPolicy {
    fn default() -> Self {
        Self {
            failover_enable: true,
            failover_history_limit: default_history_limit(),
            optimistic_transactions: true,
            reconnect_wait_time_ms: default_reconnect_wait_ms(),
            wsrep_sync_after_write: true,
            wsrep_sync_timeout_ms: default_sync_timeout_ms(),
            wsrep_sync_use_gtid: false,
            disable_update_can_self_select: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
        }
    }
}

impl FailoverPolicy {
    /// Reconnect backoff as Duration
    pub fn reconnect_wait(&self) -> Duration {
        Duration::from_millis(self.reconnect_wait_time_ms)
    }

    /// Sync-wait timeout as Duration
    pub fn sync_timeout(&self) -> Duration {
        Duration::from_millis(self.wsrep_sync_timeout_ms)
    }
}

impl ClusterConfig {
    /// Health retry interval as Duration
    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }
}

impl RouterConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    pub fn from_str(content: &str) -> crate::Result<Self> {
        let config: RouterConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.cluster.nodes.is_empty() {
            return Err(crate::Error::Config("cluster.nodes cannot be empty".into()));
        }

        let mut seen = std::collections::HashSet::new();
        for node in &self.cluster.nodes {
            if node.name.is_empty() {
                return Err(crate::Error::Config("node name cannot be empty".into()));
            }
            if node.host.is_empty() {
                return Err(crate::Error::Config(format!(
                    "node {} has an empty host",
                    node.name
                )));
            }
            if !seen.insert(node.name.as_str()) {
                return Err(crate::Error::Config(format!(
                    "duplicate node name: {}",
                    node.name
                )));
            }
        }

        let primaries = self
            .cluster
            .nodes
            .iter()
            .filter(|n| n.role == NodeRole::Primary)
            .count();
        if primaries != 1 {
            return Err(crate::Error::Config(format!(
                "expected exactly one primary node, found {}",
                primaries
            )));
        }

        if self.policy.failover_history_limit == 0 {
            return Err(crate::Error::Config(
                "policy.failover_history_limit must be at least 1".into(),
            ));
        }

        Ok(())
    }
}
