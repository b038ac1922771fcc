//! Galerouter - Transaction-Aware Galera Connection Router
//!
//! Command-line entry point: generates and validates configuration and
//! probes every configured node for wsrep readiness.

use std::path::PathBuf;

use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use galerouter::backend::{Backend, MySqlBackend};
use galerouter::cluster::{NodeRegistry, NodeRole};
use galerouter::config::RouterConfig;
use galerouter::error::Result;

/// Galerouter - Transaction-Aware Galera Connection Router
#[derive(Parser)]
#[command(name = "galerouter")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "galerouter.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new configuration file
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "galerouter.toml")]
        output: PathBuf,
    },

    /// Validate configuration file
    Validate,

    /// Connect to every configured node and report wsrep readiness
    Check {
        /// Emit the report as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(&cli.log_level);

    match cli.command {
        Commands::Init { output } => run_init(output),
        Commands::Validate => run_validate(cli.config),
        Commands::Check { json } => run_check(cli.config, json).await,
    }
}

/// Initialize logging
fn init_logging(level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Initialize configuration file
fn run_init(output: PathBuf) -> Result<()> {
    let config_content = r#"# Galerouter Configuration
# Generated configuration file

[cluster]
# Host the router runs next to; a secondary on this host is preferred
# preferred_host = "db2.example.com"
retry_interval_secs = 30

[cluster.defaults]
port = 3306
user = "galerouter"
password = "changeme"
database = "myapp"
connect_timeout_secs = 30

[[cluster.nodes]]
name = "db1"
host = "db1.example.com"
role = "primary"

[[cluster.nodes]]
name = "db2"
host = "db2.example.com"

[[cluster.nodes]]
name = "db3"
host = "db3.example.com"

[policy]
failover_enable = true
failover_history_limit = 1000
optimistic_transactions = true
reconnect_wait_time_ms = 500
wsrep_sync_after_write = true
wsrep_sync_timeout_ms = 5000
wsrep_sync_use_gtid = false

[logging]
level = "info"
format = "pretty"
"#;

    if output.exists() {
        eprintln!("✗ File already exists: {:?}", output);
        return Err(galerouter::Error::Config(format!(
            "refusing to overwrite {:?}",
            output
        )));
    }

    std::fs::write(&output, config_content)?;
    println!("✓ Configuration written to {:?}", output);
    println!("  Edit the node hosts and credentials, then run:");
    println!("  galerouter --config {:?} check", output);
    Ok(())
}

/// Validate configuration file
fn run_validate(config_path: PathBuf) -> Result<()> {
    match RouterConfig::from_file(&config_path) {
        Ok(config) => {
            let secondaries = config
                .cluster
                .nodes
                .iter()
                .filter(|n| n.role == NodeRole::Secondary)
                .count();
            println!("✓ Configuration is valid");
            println!("  Nodes: {} (1 primary, {} secondaries)", config.cluster.nodes.len(), secondaries);
            println!("  Optimistic transactions: {}", config.policy.optimistic_transactions);
            println!("  Failover: {}", config.policy.failover_enable);
            println!("  History limit: {}", config.policy.failover_history_limit);
            println!("  Sync after write: {}", config.policy.wsrep_sync_after_write);
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration error: {}", e);
            Err(e)
        }
    }
}

#[derive(Serialize)]
struct NodeCheck {
    name: String,
    host: String,
    port: u16,
    role: NodeRole,
    ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
struct CheckReport {
    timestamp: String,
    nodes: Vec<NodeCheck>,
}

/// Probe every configured node: open a connection and run the wsrep
/// readiness checks a routed session would run
async fn run_check(config_path: PathBuf, json: bool) -> Result<()> {
    let config = RouterConfig::from_file(&config_path)?;
    let registry = NodeRegistry::from_config(&config.cluster)?;
    let backend = MySqlBackend::new();

    let mut nodes = Vec::new();
    let mut all_ready = true;
    for node in registry.all() {
        let check = match backend.connect(node).await {
            Ok(conn) => {
                let _ = conn.close().await;
                NodeCheck {
                    name: node.name.clone(),
                    host: node.host.clone(),
                    port: node.port,
                    role: node.role,
                    ready: true,
                    error: None,
                }
            }
            Err(e) => {
                all_ready = false;
                NodeCheck {
                    name: node.name.clone(),
                    host: node.host.clone(),
                    port: node.port,
                    role: node.role,
                    ready: false,
                    error: Some(e.to_string()),
                }
            }
        };
        nodes.push(check);
    }

    let report = CheckReport {
        timestamp: Utc::now().to_rfc3339(),
        nodes,
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report)
                .map_err(|e| galerouter::Error::Config(e.to_string()))?
        );
    } else {
        println!("Cluster check at {}", report.timestamp);
        for n in &report.nodes {
            if n.ready {
                println!("  ✓ {} ({}:{}) {} - ready", n.name, n.host, n.port, n.role);
            } else {
                println!(
                    "  ✗ {} ({}:{}) {} - {}",
                    n.name,
                    n.host,
                    n.port,
                    n.role,
                    n.error.as_deref().unwrap_or("not ready")
                );
            }
        }
    }

    if all_ready {
        Ok(())
    } else {
        Err(galerouter::Error::Config(
            "one or more nodes are not ready".into(),
        ))
    }
}
