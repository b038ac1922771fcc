//! MySQL Backend
//!
//! Production backend over sqlx. Each session gets its own
//! `MySqlConnection` (never a pool: transaction and sync-wait state are
//! per connection). Transport faults and the wsrep-level "server refuses
//! queries" errors are translated into connectivity faults; everything
//! else passes through as a plain query fault.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlDatabaseError, MySqlRow};
use sqlx::{ConnectOptions, MySqlConnection, Row};

use super::{classify, Backend, Connection, QueryOutcome, StatementKind, Value};
use crate::cluster::Node;
use crate::error::{Error, Result};

/// MySQL server errors that indicate node-level refusal or loss rather
/// than a statement fault: 1047 unknown command (wsrep_reject_queries),
/// 2006 server has gone away, 2013 lost connection during query.
/// Deadlocks (1213) are deliberately not here: they pass through for the
/// application's own retry logic.
const CONNECTIVITY_ERRNOS: [u32; 3] = [1047, 2006, 2013];

/// wsrep status probe run after every connect, mirroring the cluster
/// variables a node must expose before it may serve queries.
const WSREP_STATUS_SQL: &str = "SELECT variable_name, variable_value \
     FROM information_schema.global_status \
     WHERE variable_name IN ('WSREP_CLUSTER_STATUS', 'WSREP_LOCAL_STATE', 'WSREP_READY') \
     UNION \
     SELECT variable_name, variable_value \
     FROM information_schema.global_variables \
     WHERE variable_name IN ('WSREP_DESYNC', 'WSREP_REJECT_QUERIES', 'WSREP_SST_DONOR_REJECTS_QUERIES')";

/// Production backend opening one MySQL connection per session
#[derive(Debug, Clone, Default)]
pub struct MySqlBackend;

impl MySqlBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Backend for MySqlBackend {
    async fn connect(&self, node: &Node) -> Result<Box<dyn Connection>> {
        let mut opts = MySqlConnectOptions::new()
            .host(&node.host)
            .port(node.port)
            .username(&node.user)
            .password(&node.password);
        if let Some(db) = &node.database {
            opts = opts.database(db);
        }

        let connect = opts.connect();
        let conn = match tokio::time::timeout(node.connect_timeout, connect).await {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => return Err(translate(&node.name, e)),
            Err(_) => {
                return Err(Error::Connectivity {
                    node: node.name.clone(),
                    reason: "connect timed out".into(),
                })
            }
        };

        let mut conn = MySqlNodeConnection {
            node: node.name.clone(),
            conn,
        };
        conn.verify_wsrep_ready().await?;
        tracing::debug!(node = %node.name, host = %node.host, "physical connection opened");
        Ok(Box::new(conn))
    }
}

struct MySqlNodeConnection {
    node: String,
    conn: MySqlConnection,
}

impl MySqlNodeConnection {
    /// Refuse nodes that are not synced members of the primary component.
    /// A donor (local state 2) is acceptable unless it rejects queries.
    async fn verify_wsrep_ready(&mut self) -> Result<()> {
        let rows = sqlx::query(WSREP_STATUS_SQL)
            .fetch_all(&mut self.conn)
            .await
            .map_err(|e| translate(&self.node, e))?;

        let mut status: HashMap<String, String> = HashMap::new();
        for row in &rows {
            let name: String = row.try_get(0).map_err(|e| translate(&self.node, e))?;
            let value: String = row.try_get(1).map_err(|e| translate(&self.node, e))?;
            status.insert(name.to_uppercase(), value.to_uppercase());
        }

        let get = |key: &str| status.get(key).map(String::as_str).unwrap_or("");

        if get("WSREP_READY") != "ON" {
            return self.refuse(format!("WSREP_READY: {}", get("WSREP_READY")));
        }
        if get("WSREP_CLUSTER_STATUS") != "PRIMARY" {
            return self.refuse(format!(
                "WSREP_CLUSTER_STATUS: {}",
                get("WSREP_CLUSTER_STATUS")
            ));
        }
        if get("WSREP_DESYNC") != "OFF" {
            return self.refuse("WSREP_DESYNC is on".into());
        }
        match get("WSREP_LOCAL_STATE") {
            "4" => {}
            "2" => {
                if get("WSREP_SST_DONOR_REJECTS_QUERIES") == "ON" {
                    return self.refuse("donor rejects queries".into());
                }
            }
            other => {
                return self.refuse(format!("WSREP_LOCAL_STATE: {}", other));
            }
        }
        if get("WSREP_REJECT_QUERIES") != "NONE" {
            return self.refuse(format!(
                "WSREP_REJECT_QUERIES: {}",
                get("WSREP_REJECT_QUERIES")
            ));
        }

        Ok(())
    }

    fn refuse(&self, reason: String) -> Result<()> {
        Err(Error::Connectivity {
            node: self.node.clone(),
            reason,
        })
    }
}

#[async_trait]
impl Connection for MySqlNodeConnection {
    fn node_name(&self) -> &str {
        &self.node
    }

    async fn execute(&mut self, statement: &str, params: &[Value]) -> Result<QueryOutcome> {
        let mut query = sqlx::query(statement);
        for param in params {
            query = bind_value(query, param);
        }

        match classify(statement) {
            StatementKind::Read => {
                let rows = query
                    .fetch_all(&mut self.conn)
                    .await
                    .map_err(|e| translate(&self.node, e))?;
                Ok(QueryOutcome::Rows(rows.iter().map(decode_row).collect()))
            }
            StatementKind::Write => {
                let result = query
                    .execute(&mut self.conn)
                    .await
                    .map_err(|e| translate(&self.node, e))?;
                Ok(QueryOutcome::Affected(result.rows_affected()))
            }
        }
    }

    async fn sync_token(&mut self) -> Result<String> {
        let row = sqlx::query("SELECT WSREP_LAST_WRITTEN_GTID()")
            .fetch_one(&mut self.conn)
            .await
            .map_err(|e| translate(&self.node, e))?;
        // the GTID comes back as text on current servers, as bytes on
        // some older ones
        if let Ok(token) = row.try_get::<String, _>(0) {
            return Ok(token);
        }
        let raw: Vec<u8> = row.try_get(0).map_err(|e| translate(&self.node, e))?;
        Ok(String::from_utf8_lossy(&raw).into_owned())
    }

    async fn wait_gtid(&mut self, token: &str) -> Result<()> {
        sqlx::query("SELECT WSREP_SYNC_WAIT_UPTO_GTID(?)")
            .bind(token)
            .fetch_one(&mut self.conn)
            .await
            .map_err(|e| translate(&self.node, e))?;
        tracing::debug!(node = %self.node, gtid = token, "secondary synced up to gtid");
        Ok(())
    }

    async fn wait_synced(&mut self) -> Result<()> {
        // bump wsrep_sync_wait for one read so the node blocks until it
        // has applied everything it has received, then restore it
        let statements = [
            "SET @wsrep_sync_wait_orig = @@wsrep_sync_wait",
            "SET SESSION wsrep_sync_wait = GREATEST(@wsrep_sync_wait_orig, 1)",
            "SELECT 1",
            "SET SESSION wsrep_sync_wait = @wsrep_sync_wait_orig",
        ];
        for sql in statements {
            sqlx::query(sql)
                .execute(&mut self.conn)
                .await
                .map_err(|e| translate(&self.node, e))?;
        }
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let node = self.node;
        sqlx::Connection::close(self.conn)
            .await
            .map_err(|e| translate(&node, e))
    }
}

type MySqlQuery<'q> = sqlx::query::Query<'q, sqlx::MySql, sqlx::mysql::MySqlArguments>;

fn bind_value<'q>(query: MySqlQuery<'q>, value: &'q Value) -> MySqlQuery<'q> {
    match value {
        Value::Null => query.bind(None::<i64>),
        Value::Bool(b) => query.bind(*b),
        Value::Int(i) => query.bind(*i),
        Value::UInt(u) => query.bind(*u),
        Value::Float(f) => query.bind(*f),
        Value::String(s) => query.bind(s.as_str()),
        Value::Bytes(b) => query.bind(b.as_slice()),
    }
}

fn decode_row(row: &MySqlRow) -> Vec<Value> {
    (0..row.len()).map(|idx| decode_cell(row, idx)).collect()
}

fn decode_cell(row: &MySqlRow, idx: usize) -> Value {
    if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
        return v.map(Value::Int).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<u64>, _>(idx) {
        return v.map(Value::UInt).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
        return v.map(Value::Float).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
        return v.map(Value::String).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(idx) {
        return v.map(Value::Bytes).unwrap_or(Value::Null);
    }
    Value::Null
}

/// Translate a sqlx error into the router's taxonomy, scoped to `node`
fn translate(node: &str, err: sqlx::Error) -> Error {
    match &err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => Error::Connectivity {
            node: node.to_string(),
            reason: err.to_string(),
        },
        sqlx::Error::Database(db) => {
            let number = db
                .try_downcast_ref::<MySqlDatabaseError>()
                .map(|e| u32::from(e.number()));
            match number {
                Some(n) if CONNECTIVITY_ERRNOS.contains(&n) => Error::Connectivity {
                    node: node.to_string(),
                    reason: err.to_string(),
                },
                _ => Error::Query {
                    code: number,
                    message: err.to_string(),
                },
            }
        }
        _ => Error::Query {
            code: None,
            message: err.to_string(),
        },
    }
}
