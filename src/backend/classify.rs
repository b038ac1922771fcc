//! Statement Classification
//!
//! Splits statements into reads and writes. Everything that is not a
//! plain SELECT counts as a write, DDL included: `SELECT ... FOR UPDATE`
//! takes locks and `SELECT ... INTO` stores rows, so both route to the
//! primary.

/// Kind of a SQL statement for routing purposes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// Read-only select, eligible for a secondary
    Read,
    /// Anything else, routed to the primary
    Write,
}

/// Classify a raw statement as read or write
pub fn classify(statement: &str) -> StatementKind {
    let upper = statement.trim().to_uppercase();
    let read = upper.starts_with("SELECT ")
        && !upper.ends_with(" FOR UPDATE")
        && !upper.contains(" INTO ");
    if read {
        StatementKind::Read
    } else {
        StatementKind::Write
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selects_are_reads() {
        assert_eq!(classify("SELECT 1"), StatementKind::Read);
        assert_eq!(classify("  select * from users  "), StatementKind::Read);
        assert_eq!(
            classify("SELECT id, name FROM users WHERE id = ?"),
            StatementKind::Read
        );
    }

    #[test]
    fn test_dml_and_ddl_are_writes() {
        assert_eq!(classify("INSERT INTO t VALUES (1)"), StatementKind::Write);
        assert_eq!(classify("UPDATE t SET a = 1"), StatementKind::Write);
        assert_eq!(classify("DELETE FROM t"), StatementKind::Write);
        assert_eq!(classify("ALTER TABLE t ADD COLUMN b INT"), StatementKind::Write);
        assert_eq!(classify("TRUNCATE t"), StatementKind::Write);
    }

    #[test]
    fn test_locking_and_storing_selects_are_writes() {
        assert_eq!(
            classify("SELECT * FROM t WHERE id = 1 FOR UPDATE"),
            StatementKind::Write
        );
        assert_eq!(
            classify("SELECT a INTO @var FROM t"),
            StatementKind::Write
        );
    }
}
