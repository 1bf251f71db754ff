//! Report types emitted by a rotation run.
//!
//! These are serialised as JSON when the operator asks for machine-readable
//! output and are otherwise rendered as summary lines. They never contain
//! field values, only record identifiers and error descriptions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Per-record failures
// ---------------------------------------------------------------------------

/// One record that could not be rotated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedRecord {
    /// Record type name (e.g. `"customer"`).
    pub kind: String,
    /// Primary key of the record.
    pub id: i64,
    /// Description of the error. Never contains field values.
    pub error: String,
}

// ---------------------------------------------------------------------------
// Tallies
// ---------------------------------------------------------------------------

/// Counts for a single record type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindSummary {
    /// Record type name.
    pub kind: String,
    /// Records re-encrypted (or verified, in a dry run) successfully.
    pub processed: u64,
    /// Records that failed.
    pub failed: u64,
    /// Pages read from storage.
    pub pages: u64,
}

/// Final report of one rotation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationSummary {
    /// Unique id of the run, for correlating logs.
    pub run_id: Uuid,
    /// Terminal state: `"completed"` or `"aborted"`.
    pub state: String,
    /// Whether records were left untouched on purpose.
    pub dry_run: bool,
    /// Page size used.
    pub chunk_size: usize,
    /// Total records processed across all types.
    pub processed_count: u64,
    /// Total records that failed across all types.
    pub failed_count: u64,
    /// Every failed record, in scan order.
    pub failed_records: Vec<FailedRecord>,
    /// Per-type breakdown in processing order.
    pub kinds: Vec<KindSummary>,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run reached a terminal state.
    pub finished_at: Option<DateTime<Utc>>,
}

impl RotationSummary {
    /// Ids of failed records, in scan order.
    pub fn failed_record_ids(&self) -> Vec<i64> {
        self.failed_records.iter().map(|f| f.id).collect()
    }

    /// `true` when the run completed and nothing failed.
    pub fn is_clean(&self) -> bool {
        self.state == "completed" && self.failed_count == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(state: &str, failed: u64) -> RotationSummary {
        RotationSummary {
            run_id: Uuid::new_v4(),
            state: state.into(),
            dry_run: false,
            chunk_size: 100,
            processed_count: 10,
            failed_count: failed,
            failed_records: (0..failed)
                .map(|i| FailedRecord {
                    kind: "customer".into(),
                    id: i as i64 + 1,
                    error: "ciphertext authentication failed".into(),
                })
                .collect(),
            kinds: vec![],
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    #[test]
    fn clean_only_when_completed_without_failures() {
        assert!(summary("completed", 0).is_clean());
        assert!(!summary("completed", 1).is_clean());
        assert!(!summary("aborted", 0).is_clean());
    }

    #[test]
    fn failed_ids_in_order() {
        assert_eq!(summary("completed", 3).failed_record_ids(), vec![1, 2, 3]);
    }

    #[test]
    fn summary_serde() {
        let s = summary("completed", 1);
        let json = serde_json::to_string(&s).unwrap();
        let decoded: RotationSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, s);
        assert!(json.contains("\"failed_count\":1"));
    }
}
