//! In-Memory Mock Backend
//!
//! A scriptable backend for exercising the router without a cluster:
//! canned per-node results, injected connectivity faults, stalled sync
//! waits, and a log of which node executed which statement.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{Backend, Connection, QueryOutcome};
use crate::backend::Value;
use crate::cluster::Node;
use crate::error::{Error, Result};

#[derive(Default)]
struct MockState {
    /// (node, statement) -> outcome, wins over `shared_results`
    node_results: HashMap<(String, String), QueryOutcome>,
    /// statement -> outcome on any node
    shared_results: HashMap<String, QueryOutcome>,
    /// statement -> deterministic query fault
    query_errors: HashMap<String, String>,
    /// nodes refusing connections and dropping live ones
    down: HashSet<String>,
    /// node -> remaining successful executes before the node goes down
    fail_after: HashMap<String, u64>,
    /// node -> number of upcoming executes that fail without downing it
    fail_next: HashMap<String, u64>,
    /// nodes whose sync waits never complete
    stall_sync: HashSet<String>,
    /// (node, statement) execution log
    log: Vec<(String, String)>,
    /// connect attempts that succeeded
    connects: Vec<String>,
}

/// Scriptable in-memory backend
#[derive(Clone, Default)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canned outcome for a statement on every node
    pub fn set_result(&self, statement: &str, outcome: QueryOutcome) {
        let mut st = self.state.lock().unwrap();
        st.shared_results.insert(statement.to_string(), outcome);
    }

    /// Canned outcome for a statement on one node, overriding the shared
    /// one; used to simulate a diverged replica
    pub fn set_node_result(&self, node: &str, statement: &str, outcome: QueryOutcome) {
        let mut st = self.state.lock().unwrap();
        st.node_results
            .insert((node.to_string(), statement.to_string()), outcome);
    }

    /// Make a statement fail deterministically (a query fault, not a
    /// connectivity fault)
    pub fn set_query_error(&self, statement: &str, message: &str) {
        let mut st = self.state.lock().unwrap();
        st.query_errors
            .insert(statement.to_string(), message.to_string());
    }

    /// Take a node down: refuses connects, drops live connections
    pub fn take_down(&self, node: &str) {
        let mut st = self.state.lock().unwrap();
        st.down.insert(node.to_string());
    }

    /// Bring a node back up
    pub fn restore(&self, node: &str) {
        let mut st = self.state.lock().unwrap();
        st.down.remove(node);
        st.fail_after.remove(node);
    }

    /// Let `n` more executes succeed on `node`, then take it down
    pub fn fail_after_executes(&self, node: &str, n: u64) {
        let mut st = self.state.lock().unwrap();
        st.fail_after.insert(node.to_string(), n);
    }

    /// Fail the next `n` executes on `node` with a connectivity fault
    /// without taking the node down (a blip, reconnects succeed)
    pub fn fail_next_executes(&self, node: &str, n: u64) {
        let mut st = self.state.lock().unwrap();
        st.fail_next.insert(node.to_string(), n);
    }

    /// Make sync waits on `node` hang until cancelled
    pub fn stall_sync(&self, node: &str) {
        let mut st = self.state.lock().unwrap();
        st.stall_sync.insert(node.to_string());
    }

    /// Full (node, statement) execution log
    pub fn log(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().log.clone()
    }

    /// Statements executed on one node, in order
    pub fn executed_on(&self, node: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .log
            .iter()
            .filter(|(n, _)| n == node)
            .map(|(_, s)| s.clone())
            .collect()
    }

    /// Successful connects, in order
    pub fn connects(&self) -> Vec<String> {
        self.state.lock().unwrap().connects.clone()
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn connect(&self, node: &Node) -> Result<Box<dyn Connection>> {
        let mut st = self.state.lock().unwrap();
        if st.down.contains(&node.name) {
            return Err(Error::Connectivity {
                node: node.name.clone(),
                reason: "connection refused".into(),
            });
        }
        st.connects.push(node.name.clone());
        Ok(Box::new(MockConnection {
            node: node.name.clone(),
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockConnection {
    node: String,
    state: Arc<Mutex<MockState>>,
}

impl MockConnection {
    fn lost(&self, reason: &str) -> Error {
        Error::Connectivity {
            node: self.node.clone(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn node_name(&self) -> &str {
        &self.node
    }

    async fn execute(&mut self, statement: &str, _params: &[Value]) -> Result<QueryOutcome> {
        let mut st = self.state.lock().unwrap();

        if st.down.contains(&self.node) {
            return Err(self.lost("connection lost"));
        }
        if let Some(n) = st.fail_next.get_mut(&self.node) {
            if *n > 0 {
                *n -= 1;
                return Err(self.lost("connection reset"));
            }
        }
        let exhausted = match st.fail_after.get_mut(&self.node) {
            Some(remaining) if *remaining == 0 => true,
            Some(remaining) => {
                *remaining -= 1;
                false
            }
            None => false,
        };
        if exhausted {
            st.down.insert(self.node.clone());
            return Err(self.lost("connection lost"));
        }
        if let Some(message) = st.query_errors.get(statement) {
            return Err(Error::Query {
                code: None,
                message: message.clone(),
            });
        }

        st.log.push((self.node.clone(), statement.to_string()));

        let outcome = st
            .node_results
            .get(&(self.node.clone(), statement.to_string()))
            .or_else(|| st.shared_results.get(statement))
            .cloned()
            .unwrap_or(QueryOutcome::Affected(0));
        Ok(outcome)
    }

    async fn sync_token(&mut self) -> Result<String> {
        Ok(format!("{}-gtid-1", self.node))
    }

    async fn wait_gtid(&mut self, _token: &str) -> Result<()> {
        self.wait_synced().await
    }

    async fn wait_synced(&mut self) -> Result<()> {
        let stalled = {
            let st = self.state.lock().unwrap();
            if st.down.contains(&self.node) {
                return Err(self.lost("connection lost"));
            }
            st.stall_sync.contains(&self.node)
        };
        if stalled {
            // hangs until the caller's timeout cancels it
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::NodeRole;
    use std::time::Duration;

    fn node(name: &str) -> Node {
        Node {
            name: name.to_string(),
            host: format!("{name}.local"),
            port: 3306,
            user: "app".into(),
            password: "pw".into(),
            database: None,
            connect_timeout: Duration::from_secs(1),
            role: NodeRole::Secondary,
            preferred: false,
        }
    }

    #[tokio::test]
    async fn test_down_node_refuses_connects_and_executes() {
        let backend = MockBackend::new();
        let mut conn = backend.connect(&node("db2")).await.unwrap();

        backend.take_down("db2");
        let err = conn.execute("SELECT 1", &[]).await.unwrap_err();
        assert!(err.is_connectivity());
        assert!(backend.connect(&node("db2")).await.is_err());

        backend.restore("db2");
        assert!(backend.connect(&node("db2")).await.is_ok());
    }

    #[tokio::test]
    async fn test_fail_after_counts_executes() {
        let backend = MockBackend::new();
        backend.fail_after_executes("db2", 2);
        let mut conn = backend.connect(&node("db2")).await.unwrap();

        assert!(conn.execute("SELECT 1", &[]).await.is_ok());
        assert!(conn.execute("SELECT 2", &[]).await.is_ok());
        assert!(conn.execute("SELECT 3", &[]).await.unwrap_err().is_connectivity());
        // the node is now down for connects too
        assert!(backend.connect(&node("db2")).await.is_err());
    }

    #[tokio::test]
    async fn test_node_result_overrides_shared() {
        let backend = MockBackend::new();
        backend.set_result("SELECT 1", QueryOutcome::Affected(1));
        backend.set_node_result("db3", "SELECT 1", QueryOutcome::Affected(99));

        let mut c2 = backend.connect(&node("db2")).await.unwrap();
        let mut c3 = backend.connect(&node("db3")).await.unwrap();
        assert_eq!(
            c2.execute("SELECT 1", &[]).await.unwrap(),
            QueryOutcome::Affected(1)
        );
        assert_eq!(
            c3.execute("SELECT 1", &[]).await.unwrap(),
            QueryOutcome::Affected(99)
        );
    }
}
