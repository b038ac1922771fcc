//! Sync-Wait Coordinator
//!
//! After a write commits on the primary, a secondary must not serve the
//! next read until it has applied that write. The wait is either
//! unconditional (the cluster's generic sync-wait facility) or pinned to
//! a GTID token obtained from the primary. Both waits are bounded: a
//! stalled node must never hang a caller.

use std::time::Duration;

use crate::error::{Error, Result};
use crate::session::Session;

/// Reference point a secondary must catch up to
#[derive(Debug, Clone)]
pub enum SyncReference {
    /// Wait using the cluster's synchronous-wait facility
    Unconditional,
    /// Wait until the node has applied replication up to this token
    Gtid(String),
}

/// Obtain the reference point for a later sync-wait. GTID mode asks the
/// primary for its last written position; otherwise the wait is
/// unconditional.
pub async fn reference_from_primary(primary: &mut Session, use_gtid: bool) -> Result<SyncReference> {
    if use_gtid && primary.is_bound() {
        let token = primary.sync_token().await?;
        tracing::debug!(gtid = %token, "sync reference taken from primary");
        return Ok(SyncReference::Gtid(token));
    }
    Ok(SyncReference::Unconditional)
}

/// Block until `secondary` has caught up to `reference`, bounded by
/// `timeout`. A timeout is reported as [`Error::SyncTimeout`] so the
/// caller can deprioritize the node without treating it as failed.
pub async fn wait_for_sync(
    secondary: &mut Session,
    reference: &SyncReference,
    timeout: Duration,
) -> Result<()> {
    let node = secondary
        .node_name()
        .unwrap_or("<unbound>")
        .to_string();

    let wait = async {
        match reference {
            SyncReference::Unconditional => secondary.wait_synced().await,
            SyncReference::Gtid(token) => secondary.wait_gtid(token).await,
        }
    };

    match tokio::time::timeout(timeout, wait).await {
        Ok(result) => result,
        Err(_) => Err(Error::SyncTimeout {
            node,
            waited_ms: timeout.as_millis() as u64,
        }),
    }
}
