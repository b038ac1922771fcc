//! Session
//!
//! The unit a caller interacts with: owns at most one live physical
//! connection at any instant and can be rebound to a different node. The
//! generation counter increments on every rebind so stale retries can be
//! detected.

use std::sync::Arc;

use uuid::Uuid;

use crate::backend::{Backend, Connection, QueryOutcome, Value};
use crate::cluster::Node;
use crate::error::{Error, Result};

pub struct Session {
    id: Uuid,
    backend: Arc<dyn Backend>,
    node: Option<Node>,
    conn: Option<Box<dyn Connection>>,
    generation: u64,
    in_tx: bool,
}

impl Session {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            id: Uuid::new_v4(),
            backend,
            node: None,
            conn: None,
            generation: 0,
            in_tx: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Rebind count; incremented every time the session moves to a node
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_bound(&self) -> bool {
        self.conn.is_some()
    }

    pub fn node(&self) -> Option<&Node> {
        self.node.as_ref()
    }

    pub fn node_name(&self) -> Option<&str> {
        self.node.as_ref().map(|n| n.name.as_str())
    }

    /// Whether a BEGIN has been issued on the current connection
    pub fn in_tx(&self) -> bool {
        self.in_tx
    }

    pub fn set_in_tx(&mut self, in_tx: bool) {
        self.in_tx = in_tx;
    }

    /// Bind this session to `node`, closing any previous connection first
    pub async fn bind(&mut self, node: Node) -> Result<()> {
        self.disconnect().await;
        self.node = None;
        let conn = self.backend.connect(&node).await?;
        self.generation += 1;
        tracing::debug!(
            session = %self.id,
            node = %node.name,
            generation = self.generation,
            "session bound"
        );
        self.node = Some(node);
        self.conn = Some(conn);
        Ok(())
    }

    /// Execute a statement on the bound connection
    pub async fn execute(&mut self, statement: &str, params: &[Value]) -> Result<QueryOutcome> {
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| Error::State("session is not bound to a node".into()))?;
        conn.execute(statement, params).await
    }

    pub async fn sync_token(&mut self) -> Result<String> {
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| Error::State("session is not bound to a node".into()))?;
        conn.sync_token().await
    }

    pub async fn wait_gtid(&mut self, token: &str) -> Result<()> {
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| Error::State("session is not bound to a node".into()))?;
        conn.wait_gtid(token).await
    }

    pub async fn wait_synced(&mut self) -> Result<()> {
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| Error::State("session is not bound to a node".into()))?;
        conn.wait_synced().await
    }

    /// Drop the physical connection, closing it best-effort. The close
    /// usually fails on the very path that needs it (the node is gone).
    pub async fn disconnect(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err(e) = conn.close().await {
                tracing::debug!(session = %self.id, "close on unbind failed: {e}");
            }
        }
        self.in_tx = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockBackend, QueryOutcome};
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
    async fn test_generation_increments_on_rebind() {
        let backend = MockBackend::new();
        let mut session = Session::new(Arc::new(backend));
        assert_eq!(session.generation(), 0);

        session.bind(node("db2")).await.unwrap();
        assert_eq!(session.generation(), 1);
        assert_eq!(session.node_name(), Some("db2"));

        session.bind(node("db3")).await.unwrap();
        assert_eq!(session.generation(), 2);
        assert_eq!(session.node_name(), Some("db3"));
    }

    #[tokio::test]
    async fn test_execute_requires_binding() {
        let backend = MockBackend::new();
        let mut session = Session::new(Arc::new(backend.clone()));
        assert!(session.execute("SELECT 1", &[]).await.is_err());

        session.bind(node("db2")).await.unwrap();
        let outcome = session.execute("SELECT 1", &[]).await.unwrap();
        assert_eq!(outcome, QueryOutcome::Affected(0));
    }

    #[tokio::test]
    async fn test_bind_failure_leaves_session_unbound() {
        let backend = MockBackend::new();
        backend.take_down("db2");
        let mut session = Session::new(Arc::new(backend));
        assert!(session.bind(node("db2")).await.is_err());
        assert!(!session.is_bound());
    }
}
