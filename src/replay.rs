//! Transaction Replay Engine
//!
//! Records every statement and a checksum of its result inside an open
//! transaction. On promotion or failover the recorded history is
//! re-executed on the new node in original order and every fresh
//! checksum is compared against the stored one. A mismatch means the new
//! node's data diverged from the expected post-replication state and the
//! transaction is aborted, never silently retried.

use crate::backend::{checksum_of, Value};
use crate::error::{Error, Result};
use crate::session::Session;

/// Routing mode of an open transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxMode {
    /// Started on a secondary under the assumption it stays read-only
    OptimisticSecondary,
    /// Pinned to the primary (a write happened, or optimism is off)
    PromotedPrimary,
}

/// Lifecycle phase of the replay engine for one transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxPhase {
    Recording,
    Replaying,
    Committed,
    Aborted,
}

/// One recorded statement, immutable once appended
#[derive(Debug, Clone)]
pub struct QueryRecord {
    /// Sequence index within the transaction
    pub index: usize,
    /// Statement text
    pub statement: String,
    /// Bound parameters
    pub params: Vec<Value>,
    /// Checksum of the original result
    pub checksum: String,
}

/// Per-transaction recording and replay state. Private to one session,
/// discarded on commit, rollback, or abort.
#[derive(Debug)]
pub struct TransactionState {
    mode: TxMode,
    phase: TxPhase,
    records: Vec<QueryRecord>,
    write_seen: bool,
    replay_disabled: bool,
    history_limit: usize,
    recorded: usize,
}

impl TransactionState {
    /// Enter RECORDING for a new transaction
    pub fn begin(optimistic: bool, history_limit: usize) -> Self {
        Self {
            mode: if optimistic {
                TxMode::OptimisticSecondary
            } else {
                TxMode::PromotedPrimary
            },
            phase: TxPhase::Recording,
            records: Vec::new(),
            write_seen: false,
            replay_disabled: false,
            history_limit,
            recorded: 0,
        }
    }

    pub fn mode(&self) -> TxMode {
        self.mode
    }

    pub fn phase(&self) -> TxPhase {
        self.phase
    }

    pub fn write_seen(&self) -> bool {
        self.write_seen
    }

    /// Replay is disabled once the history limit has been exceeded;
    /// failover then surfaces the connection loss instead of recovering
    pub fn replay_disabled(&self) -> bool {
        self.replay_disabled
    }

    pub fn history_limit(&self) -> usize {
        self.history_limit
    }

    pub fn records(&self) -> &[QueryRecord] {
        &self.records
    }

    /// Pin the transaction to the primary
    pub fn promote(&mut self) {
        self.mode = TxMode::PromotedPrimary;
    }

    /// Note that a write statement was forwarded
    pub fn mark_write(&mut self) {
        self.write_seen = true;
    }

    /// Append a record. Exceeding the history limit flips
    /// replay-disabled and drops the history; the transaction keeps
    /// running and only fails on the next connectivity fault.
    pub fn record(&mut self, statement: &str, params: &[Value], checksum: String) {
        if self.replay_disabled {
            return;
        }
        if self.recorded >= self.history_limit {
            tracing::warn!(
                limit = self.history_limit,
                "transaction history limit exceeded, replay disabled"
            );
            self.replay_disabled = true;
            self.records.clear();
            return;
        }
        self.records.push(QueryRecord {
            index: self.recorded,
            statement: statement.to_string(),
            params: params.to_vec(),
            checksum,
        });
        self.recorded += 1;
    }

    /// Re-execute the recorded history on `session` (already bound to
    /// the new node, with a transaction open) and verify checksums. On
    /// success the engine returns to RECORDING; any failure aborts.
    pub async fn replay(&mut self, session: &mut Session) -> Result<()> {
        self.phase = TxPhase::Replaying;
        tracing::info!(
            node = session.node_name().unwrap_or("<unbound>"),
            statements = self.records.len(),
            "replaying transaction history"
        );

        for record in &self.records {
            let outcome = match session.execute(&record.statement, &record.params).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    self.phase = TxPhase::Aborted;
                    return Err(e);
                }
            };
            let fresh = checksum_of(&outcome);
            if fresh != record.checksum {
                self.phase = TxPhase::Aborted;
                return Err(Error::ReplayMismatch {
                    index: record.index,
                    statement: record.statement.clone(),
                });
            }
        }

        self.phase = TxPhase::Recording;
        Ok(())
    }

    /// Leave the transaction in a terminal phase
    pub fn finish(&mut self, committed: bool) {
        self.phase = if committed {
            TxPhase::Committed
        } else {
            TxPhase::Aborted
        };
    }

    pub fn abort(&mut self) {
        self.phase = TxPhase::Aborted;
    }
}
