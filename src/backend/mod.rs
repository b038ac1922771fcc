//! Physical Backend Module
//!
//! Narrow interfaces to the database driver: open a physical connection
//! to a node, execute a statement on it, classify statements, and
//! checksum results. The router only ever talks to a node through the
//! [`Backend`] and [`Connection`] traits, so the whole routing engine can
//! be exercised against the in-memory [`MockBackend`].

mod checksum;
mod classify;
mod mock;
mod mysql;

pub use checksum::checksum_of;
pub use classify::{classify, StatementKind};
pub use mock::MockBackend;
pub use mysql::MySqlBackend;

use async_trait::async_trait;

use crate::cluster::Node;
use crate::error::Result;

/// A single SQL parameter or result cell
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
}

/// Result of executing one statement
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    /// Result set of a read
    Rows(Vec<Vec<Value>>),
    /// Affected-row count of a write
    Affected(u64),
}

impl QueryOutcome {
    /// Row count for reads, affected count for writes
    pub fn row_count(&self) -> u64 {
        match self {
            QueryOutcome::Rows(rows) => rows.len() as u64,
            QueryOutcome::Affected(n) => *n,
        }
    }
}

/// A live physical connection to one node
#[async_trait]
pub trait Connection: Send {
    /// Name of the node this connection is bound to
    fn node_name(&self) -> &str;

    /// Execute a statement with bound parameters
    async fn execute(&mut self, statement: &str, params: &[Value]) -> Result<QueryOutcome>;

    /// Fetch a replication position token (called on the primary after a
    /// commit, GTID mode only)
    async fn sync_token(&mut self) -> Result<String>;

    /// Block until this node has applied replication up to `token`
    async fn wait_gtid(&mut self, token: &str) -> Result<()>;

    /// Block until this node reports itself synced (generic wsrep
    /// sync-wait facility)
    async fn wait_synced(&mut self) -> Result<()>;

    /// Close the connection
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Opens physical connections to cluster nodes
#[async_trait]
pub trait Backend: Send + Sync {
    /// Open a connection to `node`. Transport faults and unhealthy wsrep
    /// state both surface as connectivity errors.
    async fn connect(&self, node: &Node) -> Result<Box<dyn Connection>>;
}
