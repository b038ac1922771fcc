//! Result Checksums
//!
//! Canonical SHA-1 digest of a statement's result, recorded per statement
//! inside a transaction and compared during replay.

use sha1::{Digest, Sha1};

use super::{QueryOutcome, Value};

/// Checksum a statement result for later replay verification.
///
/// Comparison assumes the server returns rows in a stable order for
/// identical statements; a SELECT without ORDER BY that legally reorders
/// rows between nodes will mismatch and abort the transaction.
pub fn checksum_of(outcome: &QueryOutcome) -> String {
    let mut hasher = Sha1::new();
    match outcome {
        QueryOutcome::Affected(n) => {
            hasher.update(b"affected:");
            hasher.update(n.to_le_bytes());
        }
        QueryOutcome::Rows(rows) => {
            hasher.update(b"rows:");
            hasher.update((rows.len() as u64).to_le_bytes());
            for row in rows {
                for value in row {
                    hash_value(&mut hasher, value);
                }
                // row separator
                hasher.update([0x1e]);
            }
        }
    }
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

fn hash_value(hasher: &mut Sha1, value: &Value) {
    match value {
        Value::Null => hasher.update([0u8]),
        Value::Bool(b) => {
            hasher.update([1u8]);
            hasher.update([*b as u8]);
        }
        Value::Int(i) => {
            hasher.update([2u8]);
            hasher.update(i.to_le_bytes());
        }
        Value::UInt(u) => {
            hasher.update([3u8]);
            hasher.update(u.to_le_bytes());
        }
        Value::Float(f) => {
            hasher.update([4u8]);
            hasher.update(f.to_le_bytes());
        }
        Value::String(s) => {
            hasher.update([5u8]);
            hasher.update((s.len() as u64).to_le_bytes());
            hasher.update(s.as_bytes());
        }
        Value::Bytes(b) => {
            hasher.update([6u8]);
            hasher.update((b.len() as u64).to_le_bytes());
            hasher.update(b);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(values: Vec<Vec<Value>>) -> QueryOutcome {
        QueryOutcome::Rows(values)
    }

    #[test]
    fn test_identical_results_checksum_identically() {
        let a = rows(vec![
            vec![Value::Int(1), Value::String("alice".into())],
            vec![Value::Int(2), Value::String("bob".into())],
        ]);
        let b = rows(vec![
            vec![Value::Int(1), Value::String("alice".into())],
            vec![Value::Int(2), Value::String("bob".into())],
        ]);
        assert_eq!(checksum_of(&a), checksum_of(&b));
    }

    #[test]
    fn test_value_change_changes_checksum() {
        let a = rows(vec![vec![Value::Int(1)]]);
        let b = rows(vec![vec![Value::Int(2)]]);
        assert_ne!(checksum_of(&a), checksum_of(&b));
    }

    #[test]
    fn test_row_order_changes_checksum() {
        let a = rows(vec![vec![Value::Int(1)], vec![Value::Int(2)]]);
        let b = rows(vec![vec![Value::Int(2)], vec![Value::Int(1)]]);
        assert_ne!(checksum_of(&a), checksum_of(&b));
    }

    #[test]
    fn test_affected_counts_differ_from_rows() {
        let a = QueryOutcome::Affected(1);
        let b = rows(vec![vec![Value::Int(1)]]);
        assert_ne!(checksum_of(&a), checksum_of(&b));
        assert_eq!(checksum_of(&a), checksum_of(&QueryOutcome::Affected(1)));
    }

    #[test]
    fn test_null_and_zero_distinct() {
        let a = rows(vec![vec![Value::Null]]);
        let b = rows(vec![vec![Value::Int(0)]]);
        assert_ne!(checksum_of(&a), checksum_of(&b));
    }
}
