//! Galerouter - Transaction-Aware Galera Connection Router
//!
//! A connection router that sits in front of a Galera-style synchronous
//! multi-master MariaDB cluster. Writes are funneled to a single primary
//! node, reads are load balanced across healthy secondaries, and node
//! failures mid-transaction are survived by replaying the transaction's
//! recorded statement history on a replacement node and verifying result
//! checksums.
//!
//! # Architecture
//!
//! The router keeps a shared registry of cluster nodes with live health
//! flags. Each application-facing session owns at most one physical
//! connection per role and classifies every statement as a read or a
//! write. Transactions start optimistically on a secondary and are
//! promoted to the primary the instant a write is detected, replaying all
//! previously recorded statements there first.
//!
//! # Features
//!
//! - Read/write splitting with preferred-node affinity
//! - Optimistic transactions with replay-on-promotion
//! - Transparent failover with checksum-verified history replay
//! - wsrep sync-wait gating after writes (generic or GTID based)
//! - Live-mutable failover policy
//! - wsrep readiness verification on every physical connect

pub mod backend;
pub mod cluster;
pub mod config;
pub mod error;
pub mod replay;
pub mod router;
pub mod session;
pub mod syncwait;

pub use config::RouterConfig;
pub use error::{Error, Result};
pub use router::{RoutedSession, Router};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::backend::{Backend, Connection, QueryOutcome, Value};
    pub use crate::cluster::{Node, NodeHealth, NodeRegistry, NodeRole, NodeSelector};
    pub use crate::config::{FailoverPolicy, RouterConfig};
    pub use crate::error::{Error, Result};
    pub use crate::router::{RoutedSession, Router};
}
