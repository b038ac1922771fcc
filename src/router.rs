//! Router
//!
//! The orchestrator: classifies each statement, routes it to the primary
//! or a secondary session, records it for replay, promotes optimistic
//! transactions on the first write, and recovers from connectivity
//! faults by failing over to a replacement node and replaying the
//! transaction history there.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::backend::{checksum_of, classify, Backend, QueryOutcome, StatementKind, Value};
use crate::cluster::{NodeRegistry, NodeSelector};
use crate::config::FailoverPolicy;
use crate::error::{Error, Result};
use crate::replay::{TransactionState, TxMode};
use crate::session::Session;
use crate::syncwait;

/// Shared handle to the live-mutable failover policy. Every option can
/// be changed at runtime; the router re-reads it per statement.
pub type PolicyHandle = Arc<RwLock<FailoverPolicy>>;

/// Cluster-wide router state shared by all routed sessions
pub struct Router {
    registry: Arc<NodeRegistry>,
    backend: Arc<dyn Backend>,
    policy: PolicyHandle,
}

impl Router {
    pub fn new(
        registry: Arc<NodeRegistry>,
        backend: Arc<dyn Backend>,
        policy: FailoverPolicy,
    ) -> Self {
        Self {
            registry,
            backend,
            policy: Arc::new(RwLock::new(policy)),
        }
    }

    /// The shared policy handle, for live reconfiguration
    pub fn policy(&self) -> PolicyHandle {
        Arc::clone(&self.policy)
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    /// Create a routed session for one logical caller
    pub fn session(&self) -> RoutedSession {
        RoutedSession {
            registry: Arc::clone(&self.registry),
            selector: NodeSelector::new(Arc::clone(&self.registry)),
            policy: Arc::clone(&self.policy),
            primary: Session::new(Arc::clone(&self.backend)),
            secondary: Session::new(Arc::clone(&self.backend)),
            tx: None,
            secondary_synced: true,
        }
    }
}

/// Application-visible logical connection. Owned by one caller at a
/// time; statements within it are sequential.
pub struct RoutedSession {
    registry: Arc<NodeRegistry>,
    selector: NodeSelector,
    policy: PolicyHandle,
    primary: Session,
    secondary: Session,
    tx: Option<TransactionState>,
    /// False after a write until the bound secondary passed a sync wait
    secondary_synced: bool,
}

impl RoutedSession {
    /// Execute one statement, routing it per the current transaction
    /// mode and policy. Connectivity faults are handled here via
    /// failover-and-replay; every other fault propagates unchanged.
    pub async fn execute(&mut self, statement: &str, params: &[Value]) -> Result<QueryOutcome> {
        let kind = classify(statement);
        let policy = self.policy.read().await.clone();

        if kind == StatementKind::Write {
            self.secondary_synced = false;
        }

        let tx_mode = self.tx.as_ref().map(|t| t.mode());
        let mut use_primary = match (tx_mode, kind) {
            (Some(TxMode::PromotedPrimary), _) => true,
            (Some(TxMode::OptimisticSecondary), StatementKind::Write) => {
                self.promote(&policy).await?;
                true
            }
            (Some(TxMode::OptimisticSecondary), StatementKind::Read) => false,
            (None, StatementKind::Write) => true,
            (None, StatementKind::Read) => false,
        };

        if !use_primary {
            match self.ensure_secondary(&policy).await {
                Ok(()) => {}
                Err(Error::NoAvailableNode { .. }) if tx_mode.is_none() => {
                    debug!("no secondary available, routing read to primary");
                    use_primary = true;
                }
                Err(e) => return Err(e),
            }
        }
        if use_primary {
            self.ensure_primary().await?;
        }

        if self.tx.is_some() {
            self.ensure_tx_started(use_primary).await?;
        }

        let outcome = self
            .execute_with_failover(use_primary, statement, params, &policy)
            .await?;

        if let Some(tx) = &mut self.tx {
            tx.record(statement, params, checksum_of(&outcome));
            if kind == StatementKind::Write {
                tx.mark_write();
            }
        }

        Ok(outcome)
    }

    /// Open a transaction. Optimistic transactions start on a secondary
    /// and are promoted on the first write; otherwise every statement
    /// goes straight to the primary.
    pub async fn begin(&mut self) -> Result<()> {
        if self.tx.is_some() {
            return Err(Error::State("transaction already open".into()));
        }
        let policy = self.policy.read().await.clone();
        let tx = TransactionState::begin(
            policy.optimistic_transactions,
            policy.failover_history_limit,
        );
        debug!(mode = ?tx.mode(), "transaction opened");
        self.tx = Some(tx);
        Ok(())
    }

    /// Commit the open transaction
    pub async fn commit(&mut self) -> Result<()> {
        let mut tx = self
            .tx
            .take()
            .ok_or_else(|| Error::State("no open transaction".into()))?;

        let session = match tx.mode() {
            TxMode::PromotedPrimary => &mut self.primary,
            TxMode::OptimisticSecondary => &mut self.secondary,
        };
        if session.in_tx() {
            session.execute("COMMIT", &[]).await?;
            session.set_in_tx(false);
        }
        if tx.write_seen() {
            // gate the next secondary read behind a sync wait
            self.secondary_synced = false;
        }
        tx.finish(true);
        Ok(())
    }

    /// Roll back the open transaction
    pub async fn rollback(&mut self) -> Result<()> {
        let mut tx = self
            .tx
            .take()
            .ok_or_else(|| Error::State("no open transaction".into()))?;

        let session = match tx.mode() {
            TxMode::PromotedPrimary => &mut self.primary,
            TxMode::OptimisticSecondary => &mut self.secondary,
        };
        if session.in_tx() {
            session.execute("ROLLBACK", &[]).await?;
            session.set_in_tx(false);
        }
        tx.finish(false);
        Ok(())
    }

    /// Close both physical connections and discard transaction state
    pub async fn close(&mut self) {
        self.primary.disconnect().await;
        self.secondary.disconnect().await;
        self.tx = None;
    }

    /// The open transaction's state, if any
    pub fn transaction(&self) -> Option<&TransactionState> {
        self.tx.as_ref()
    }

    pub fn primary_session(&self) -> &Session {
        &self.primary
    }

    pub fn secondary_session(&self) -> &Session {
        &self.secondary
    }

    /// Promotion: the first write in an optimistic transaction moves the
    /// whole transaction to the primary. Recorded statements are
    /// replayed there under the same checksum-verification contract as
    /// failover, then the secondary's read-only snapshot is abandoned.
    async fn promote(&mut self, _policy: &FailoverPolicy) -> Result<()> {
        info!("write in optimistic transaction, promoting to primary");
        self.ensure_primary().await?;

        let mut tx = match self.tx.take() {
            Some(tx) => tx,
            None => return Ok(()),
        };

        if !self.primary.in_tx() {
            if let Err(e) = self.primary.execute("BEGIN", &[]).await {
                tx.abort();
                return Err(e);
            }
            self.primary.set_in_tx(true);
        }

        if let Err(e) = tx.replay(&mut self.primary).await {
            warn!("replay on primary failed, aborting transaction: {e}");
            let _ = self.primary.execute("ROLLBACK", &[]).await;
            self.primary.set_in_tx(false);
            return Err(e);
        }

        if self.secondary.in_tx() {
            let _ = self.secondary.execute("ROLLBACK", &[]).await;
            self.secondary.set_in_tx(false);
        }

        tx.promote();
        self.tx = Some(tx);
        Ok(())
    }

    /// Bind the primary session if needed. The primary is never load
    /// balanced; a connect failure here has no failover target.
    async fn ensure_primary(&mut self) -> Result<()> {
        if self.primary.is_bound() {
            return Ok(());
        }
        let node = self.registry.primary().clone();
        match self.primary.bind(node.clone()).await {
            Ok(()) => {
                self.registry.mark_healthy(&node.name).await;
                Ok(())
            }
            Err(e) => {
                if e.is_connectivity() {
                    self.registry.mark_failed(&node.name).await;
                }
                Err(e)
            }
        }
    }

    /// Bind the secondary session if needed and pass the sync gate
    async fn ensure_secondary(&mut self, policy: &FailoverPolicy) -> Result<()> {
        if !self.secondary.is_bound() {
            self.bind_secondary(&HashSet::new()).await?;
        }
        if policy.wsrep_sync_after_write && !self.secondary_synced {
            self.sync_secondary(policy).await?;
        }
        Ok(())
    }

    /// Bind the secondary session to a selected node, marking nodes that
    /// refuse the connection failed and moving on to the next candidate
    async fn bind_secondary(&mut self, exclude: &HashSet<String>) -> Result<()> {
        let mut tried = exclude.clone();
        loop {
            let node = self.selector.pick_secondary(&tried).await?;
            match self.secondary.bind(node.clone()).await {
                Ok(()) => {
                    self.registry.mark_healthy(&node.name).await;
                    return Ok(());
                }
                Err(e) if e.is_connectivity() => {
                    warn!(node = %node.name, "secondary connect failed: {e}");
                    self.registry.mark_failed(&node.name).await;
                    tried.insert(node.name);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Block until the bound secondary has applied replication. A node
    /// that times out is marked suspected, not failed, and selection is
    /// retried excluding it.
    async fn sync_secondary(&mut self, policy: &FailoverPolicy) -> Result<()> {
        let timeout = policy.sync_timeout();
        loop {
            let reference =
                syncwait::reference_from_primary(&mut self.primary, policy.wsrep_sync_use_gtid)
                    .await?;
            match syncwait::wait_for_sync(&mut self.secondary, &reference, timeout).await {
                Ok(()) => {
                    self.secondary_synced = true;
                    return Ok(());
                }
                Err(Error::SyncTimeout { node, waited_ms }) => {
                    warn!(
                        node = %node,
                        waited_ms,
                        "sync wait timed out, marking secondary suspected"
                    );
                    self.registry.mark_suspected(&node).await;
                    let mut exclude = HashSet::new();
                    exclude.insert(node);
                    self.bind_secondary(&exclude).await?;
                }
                Err(e) => {
                    // lag verification is best effort; a fault here is
                    // logged and the read proceeds, like an unrouted
                    // connection would
                    warn!("sync wait failed: {e}");
                    self.secondary_synced = true;
                    return Ok(());
                }
            }
        }
    }

    /// Issue BEGIN on the target session if the open transaction has not
    /// started there yet
    async fn ensure_tx_started(&mut self, use_primary: bool) -> Result<()> {
        let session = if use_primary {
            &mut self.primary
        } else {
            &mut self.secondary
        };
        if !session.in_tx() {
            session.execute("BEGIN", &[]).await?;
            session.set_in_tx(true);
        }
        Ok(())
    }

    /// Execute on the target session; a connectivity fault triggers one
    /// failover-and-replay cycle, then the statement is re-issued once.
    async fn execute_with_failover(
        &mut self,
        use_primary: bool,
        statement: &str,
        params: &[Value],
        policy: &FailoverPolicy,
    ) -> Result<QueryOutcome> {
        let first = {
            let session = if use_primary {
                &mut self.primary
            } else {
                &mut self.secondary
            };
            session.execute(statement, params).await
        };

        match first {
            Ok(outcome) => Ok(outcome),
            Err(e) if e.is_connectivity() && policy.failover_enable => {
                warn!("connectivity fault, attempting failover: {e}");
                self.failover(use_primary, policy).await?;
                let session = if use_primary {
                    &mut self.primary
                } else {
                    &mut self.secondary
                };
                session.execute(statement, params).await
            }
            Err(e) => {
                if e.is_connectivity() {
                    if let Some(tx) = &mut self.tx {
                        tx.abort();
                    }
                    self.tx = None;
                }
                Err(e)
            }
        }
    }

    /// Failover: mark the failing node, back off, rebind (the primary
    /// stays primary; a failed secondary is replaced), then replay any
    /// recorded transaction history on the new connection.
    async fn failover(&mut self, use_primary: bool, policy: &FailoverPolicy) -> Result<()> {
        let failed = {
            let session = if use_primary {
                &mut self.primary
            } else {
                &mut self.secondary
            };
            let name = session
                .node_name()
                .map(str::to_string)
                .ok_or_else(|| Error::State("failover on an unbound session".into()))?;
            session.disconnect().await;
            name
        };
        self.registry.mark_failed(&failed).await;

        // a replay-disabled transaction cannot be recovered: surface the
        // loss instead of silently failing over
        if let Some(tx) = &mut self.tx {
            if tx.replay_disabled() {
                let limit = tx.history_limit();
                tx.abort();
                self.tx = None;
                return Err(Error::HistoryLimitExceeded { limit });
            }
        }

        tokio::time::sleep(policy.reconnect_wait()).await;

        if use_primary {
            let node = self.registry.primary().clone();
            if let Err(e) = self.primary.bind(node.clone()).await {
                if let Some(tx) = &mut self.tx {
                    tx.abort();
                }
                self.tx = None;
                return Err(e);
            }
            self.registry.mark_healthy(&node.name).await;
        } else {
            let mut exclude = HashSet::new();
            exclude.insert(failed.clone());
            if let Err(e) = self.bind_secondary(&exclude).await {
                if let Some(tx) = &mut self.tx {
                    tx.abort();
                }
                self.tx = None;
                return Err(e);
            }
        }

        if let Some(mut tx) = self.tx.take() {
            let session = if use_primary {
                &mut self.primary
            } else {
                &mut self.secondary
            };
            if let Err(e) = session.execute("BEGIN", &[]).await {
                tx.abort();
                return Err(e);
            }
            session.set_in_tx(true);
            if let Err(e) = tx.replay(session).await {
                warn!("replay after failover failed, aborting transaction: {e}");
                let _ = session.execute("ROLLBACK", &[]).await;
                session.set_in_tx(false);
                return Err(e);
            }
            info!(
                node = session.node_name().unwrap_or("<unbound>"),
                "failover complete, transaction history replayed"
            );
            self.tx = Some(tx);
        } else {
            info!(node = %failed, "failover complete, session rebound");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockBackend, Value};
    use crate::cluster::NodeHealth;
    use crate::config::RouterConfig;
    use crate::replay::TxMode;

    /// db1 primary, db2 preferred secondary (deterministic selection),
    /// db3 secondary; short backoffs for tests
    fn config() -> RouterConfig {
        RouterConfig::from_str(
            r#"
[[cluster.nodes]]
name = "db1"
host = "db1.local"
role = "primary"

[[cluster.nodes]]
name = "db2"
host = "db2.local"
preferred = true

[[cluster.nodes]]
name = "db3"
host = "db3.local"

[policy]
reconnect_wait_time_ms = 1
wsrep_sync_timeout_ms = 20
"#,
        )
        .unwrap()
    }

    fn router(backend: &MockBackend) -> Router {
        let config = config();
        let registry = Arc::new(NodeRegistry::from_config(&config.cluster).unwrap());
        Router::new(registry, Arc::new(backend.clone()), config.policy)
    }

    fn rows(n: i64) -> QueryOutcome {
        QueryOutcome::Rows(vec![vec![Value::Int(n)]])
    }

    #[tokio::test]
    async fn test_reads_to_secondary_writes_to_primary() {
        let backend = MockBackend::new();
        let r = router(&backend);
        let mut sess = r.session();

        sess.execute("SELECT 1", &[]).await.unwrap();
        sess.execute("INSERT INTO t VALUES (1)", &[]).await.unwrap();
        sess.execute("SELECT 2", &[]).await.unwrap();

        assert_eq!(backend.executed_on("db2"), vec!["SELECT 1", "SELECT 2"]);
        assert_eq!(backend.executed_on("db1"), vec!["INSERT INTO t VALUES (1)"]);
        assert!(backend.executed_on("db3").is_empty());
    }

    #[tokio::test]
    async fn test_read_falls_back_to_primary_without_secondaries() {
        let backend = MockBackend::new();
        let r = router(&backend);
        r.registry().mark_failed("db2").await;
        r.registry().mark_failed("db3").await;

        let mut sess = r.session();
        sess.execute("SELECT 1", &[]).await.unwrap();
        assert_eq!(backend.executed_on("db1"), vec!["SELECT 1"]);
    }

    #[tokio::test]
    async fn test_scenario_a_optimistic_promotion() {
        let backend = MockBackend::new();
        backend.set_result("SELECT 1", rows(1));
        backend.set_result("SELECT 2", rows(2));
        backend.set_result("SELECT 3", rows(3));
        let r = router(&backend);
        let mut sess = r.session();

        sess.begin().await.unwrap();
        sess.execute("SELECT 1", &[]).await.unwrap();
        sess.execute("SELECT 2", &[]).await.unwrap();
        sess.execute("SELECT 3", &[]).await.unwrap();
        assert_eq!(
            sess.transaction().unwrap().mode(),
            TxMode::OptimisticSecondary
        );

        sess.execute("INSERT INTO t VALUES (1)", &[]).await.unwrap();
        assert_eq!(sess.transaction().unwrap().mode(), TxMode::PromotedPrimary);

        // the three reads were replayed on the primary before the write
        assert_eq!(
            backend.executed_on("db1"),
            vec![
                "BEGIN",
                "SELECT 1",
                "SELECT 2",
                "SELECT 3",
                "INSERT INTO t VALUES (1)"
            ]
        );
        // the secondary's read-only snapshot was abandoned
        assert_eq!(
            backend.executed_on("db2"),
            vec!["BEGIN", "SELECT 1", "SELECT 2", "SELECT 3", "ROLLBACK"]
        );

        sess.commit().await.unwrap();
        assert_eq!(backend.executed_on("db1").last().unwrap(), "COMMIT");
    }

    #[tokio::test]
    async fn test_promotion_invariant_no_secondary_after_write() {
        let backend = MockBackend::new();
        let r = router(&backend);
        let mut sess = r.session();

        sess.begin().await.unwrap();
        sess.execute("INSERT INTO t VALUES (1)", &[]).await.unwrap();
        sess.execute("SELECT 1", &[]).await.unwrap();
        sess.execute("SELECT 2", &[]).await.unwrap();
        sess.commit().await.unwrap();

        // once promoted, nothing else touches a secondary
        assert!(backend.executed_on("db2").is_empty());
        assert!(backend.executed_on("db3").is_empty());
        assert_eq!(
            backend.executed_on("db1"),
            vec![
                "BEGIN",
                "INSERT INTO t VALUES (1)",
                "SELECT 1",
                "SELECT 2",
                "COMMIT"
            ]
        );
    }

    #[tokio::test]
    async fn test_scenario_b_transparent_failover() {
        let backend = MockBackend::new();
        backend.set_result("SELECT 1", rows(1));
        backend.set_result("SELECT 2", rows(2));
        backend.set_result("SELECT 3", rows(3));
        let r = router(&backend);
        let mut sess = r.session();

        sess.begin().await.unwrap();
        sess.execute("SELECT 1", &[]).await.unwrap();
        sess.execute("SELECT 2", &[]).await.unwrap();

        let generation_before = sess.secondary_session().generation();
        backend.take_down("db2");

        // caller observes no error
        let outcome = sess.execute("SELECT 3", &[]).await.unwrap();
        assert_eq!(outcome, rows(3));

        assert_eq!(
            r.registry().health_of("db2").await.unwrap(),
            NodeHealth::Failed
        );
        assert_eq!(
            backend.executed_on("db3"),
            vec!["BEGIN", "SELECT 1", "SELECT 2", "SELECT 3"]
        );
        assert_eq!(
            sess.secondary_session().generation(),
            generation_before + 1
        );

        // the transaction keeps going on the new node
        sess.execute("SELECT 1", &[]).await.unwrap();
        sess.commit().await.unwrap();
        assert_eq!(backend.executed_on("db3").last().unwrap(), "COMMIT");
    }

    #[tokio::test]
    async fn test_scenario_c_replay_mismatch_aborts() {
        let backend = MockBackend::new();
        backend.set_result("SELECT 1", rows(1));
        backend.set_result("SELECT 2", rows(2));
        // db3 answers the second read differently: diverged replica
        backend.set_node_result("db3", "SELECT 2", rows(99));
        let r = router(&backend);
        let mut sess = r.session();

        sess.begin().await.unwrap();
        sess.execute("SELECT 1", &[]).await.unwrap();
        sess.execute("SELECT 2", &[]).await.unwrap();

        backend.take_down("db2");
        let err = sess.execute("SELECT 3", &[]).await.unwrap_err();
        assert!(matches!(err, Error::ReplayMismatch { index: 1, .. }));
        assert!(err.is_fatal_to_transaction());
        assert!(sess.transaction().is_none());
    }

    #[tokio::test]
    async fn test_scenario_d_history_limit_disables_replay() {
        let backend = MockBackend::new();
        let r = router(&backend);
        r.policy().write().await.failover_history_limit = 2;
        let mut sess = r.session();

        sess.begin().await.unwrap();
        sess.execute("SELECT 1", &[]).await.unwrap();
        sess.execute("SELECT 2", &[]).await.unwrap();
        assert!(!sess.transaction().unwrap().replay_disabled());

        // third record flips replay-disabled without an error
        sess.execute("SELECT 3", &[]).await.unwrap();
        assert!(sess.transaction().unwrap().replay_disabled());

        // the next connectivity fault is a hard loss, not a failover
        backend.take_down("db2");
        let err = sess.execute("SELECT 4", &[]).await.unwrap_err();
        assert!(matches!(err, Error::HistoryLimitExceeded { limit: 2 }));
        assert!(sess.transaction().is_none());
        assert!(backend.executed_on("db3").is_empty());
    }

    #[tokio::test]
    async fn test_scenario_e_sync_timeout_suspects_node() {
        let backend = MockBackend::new();
        backend.stall_sync("db2");
        let r = router(&backend);
        let mut sess = r.session();

        // a write clears the synced flag
        sess.execute("INSERT INTO t VALUES (1)", &[]).await.unwrap();
        // the next read must wait; db2 stalls past the timeout
        sess.execute("SELECT 1", &[]).await.unwrap();

        assert_eq!(
            r.registry().health_of("db2").await.unwrap(),
            NodeHealth::Suspected
        );
        assert_eq!(backend.executed_on("db3"), vec!["SELECT 1"]);
        assert!(backend.executed_on("db2").is_empty());
    }

    #[tokio::test]
    async fn test_gtid_sync_reference_taken_from_primary() {
        let backend = MockBackend::new();
        let r = router(&backend);
        r.policy().write().await.wsrep_sync_use_gtid = true;
        let mut sess = r.session();

        sess.execute("INSERT INTO t VALUES (1)", &[]).await.unwrap();
        sess.execute("SELECT 1", &[]).await.unwrap();

        assert_eq!(backend.executed_on("db2"), vec!["SELECT 1"]);
    }

    #[tokio::test]
    async fn test_query_errors_pass_through_without_failover() {
        let backend = MockBackend::new();
        backend.set_query_error("SELECT boom", "Unknown column 'boom'");
        let r = router(&backend);
        let mut sess = r.session();

        sess.begin().await.unwrap();
        sess.execute("SELECT 1", &[]).await.unwrap();

        let err = sess.execute("SELECT boom", &[]).await.unwrap_err();
        assert!(matches!(err, Error::Query { .. }));

        // no node was blamed and the transaction is still open
        assert_eq!(
            r.registry().health_of("db2").await.unwrap(),
            NodeHealth::Healthy
        );
        assert!(sess.transaction().is_some());
        sess.execute("SELECT 2", &[]).await.unwrap();
        sess.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_non_optimistic_transactions_pin_to_primary() {
        let backend = MockBackend::new();
        let r = router(&backend);
        r.policy().write().await.optimistic_transactions = false;
        let mut sess = r.session();

        sess.begin().await.unwrap();
        assert_eq!(sess.transaction().unwrap().mode(), TxMode::PromotedPrimary);
        sess.execute("SELECT 1", &[]).await.unwrap();
        sess.commit().await.unwrap();

        assert_eq!(
            backend.executed_on("db1"),
            vec!["BEGIN", "SELECT 1", "COMMIT"]
        );
        assert!(backend.executed_on("db2").is_empty());
    }

    #[tokio::test]
    async fn test_autocommit_write_retried_after_blip() {
        let backend = MockBackend::new();
        backend.fail_next_executes("db1", 1);
        let r = router(&backend);
        let mut sess = r.session();

        let generation_before = sess.primary_session().generation();
        sess.execute("INSERT INTO t VALUES (1)", &[]).await.unwrap();

        // reconnected to the same primary and re-issued once
        assert_eq!(sess.primary_session().generation(), generation_before + 2);
        assert_eq!(backend.executed_on("db1"), vec!["INSERT INTO t VALUES (1)"]);
        assert_eq!(
            r.registry().health_of("db1").await.unwrap(),
            NodeHealth::Healthy
        );
    }

    #[tokio::test]
    async fn test_failover_disabled_surfaces_connectivity() {
        let backend = MockBackend::new();
        let r = router(&backend);
        r.policy().write().await.failover_enable = false;
        let mut sess = r.session();

        sess.execute("SELECT 1", &[]).await.unwrap();
        backend.take_down("db2");

        let err = sess.execute("SELECT 2", &[]).await.unwrap_err();
        assert!(err.is_connectivity());
    }

    #[tokio::test]
    async fn test_policy_is_live_mutable() {
        let backend = MockBackend::new();
        let r = router(&backend);
        let mut sess = r.session();

        sess.begin().await.unwrap();
        assert_eq!(
            sess.transaction().unwrap().mode(),
            TxMode::OptimisticSecondary
        );
        sess.rollback().await.unwrap();

        r.policy().write().await.optimistic_transactions = false;
        sess.begin().await.unwrap();
        assert_eq!(sess.transaction().unwrap().mode(), TxMode::PromotedPrimary);
        sess.rollback().await.unwrap();
    }
}
