//! [`RotationJob`]: the per-run report. Created for one invocation, discarded
//! once its summary has been emitted; never persisted.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use common::{FailedRecord, KindSummary, RotationSummary};
use uuid::Uuid;

use super::runner::RotationOptions;
use super::RotationRecordError;
use crate::record::RecordKind;

/// Lifecycle of a run: `NotStarted → Running → {Completed | Aborted}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    NotStarted,
    Running,
    /// The scan finished. Individual records may still have failed.
    Completed,
    /// A precondition or page read failed; the scan did not finish.
    Aborted,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::NotStarted => "not_started",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Aborted => "aborted",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Tally {
    processed: u64,
    failed: u64,
    pages: u64,
}

/// Counters and failures for one rotation run.
#[derive(Debug, Clone)]
pub struct RotationJob {
    run_id: Uuid,
    target_types: Vec<RecordKind>,
    chunk_size: usize,
    dry_run: bool,
    state: JobState,
    processed_count: u64,
    failed_count: u64,
    failed_records: Vec<FailedRecord>,
    tallies: BTreeMap<RecordKind, Tally>,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl RotationJob {
    /// A job in [`JobState::NotStarted`] for the given options.
    pub fn new(options: &RotationOptions) -> Self {
        let target_types = options.normalized_targets();
        let tallies = target_types.iter().map(|k| (*k, Tally::default())).collect();
        Self {
            run_id: Uuid::new_v4(),
            target_types,
            chunk_size: options.chunk_size,
            dry_run: options.dry_run,
            state: JobState::NotStarted,
            processed_count: 0,
            failed_count: 0,
            failed_records: Vec::new(),
            tallies,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn target_types(&self) -> &[RecordKind] {
        &self.target_types
    }

    pub fn processed_count(&self) -> u64 {
        self.processed_count
    }

    pub fn failed_count(&self) -> u64 {
        self.failed_count
    }

    pub fn failed_records(&self) -> &[FailedRecord] {
        &self.failed_records
    }

    /// Ids of failed records, in scan order.
    pub fn failed_record_ids(&self) -> Vec<i64> {
        self.failed_records.iter().map(|f| f.id).collect()
    }

    /// Records seen so far for `kind` (processed plus failed).
    pub fn seen(&self, kind: RecordKind) -> u64 {
        self.tallies
            .get(&kind)
            .map_or(0, |t| t.processed + t.failed)
    }

    /// Counts for one kind.
    pub fn kind_summary(&self, kind: RecordKind) -> KindSummary {
        let t = self.tallies.get(&kind).copied().unwrap_or_default();
        KindSummary {
            kind: kind.name().to_owned(),
            processed: t.processed,
            failed: t.failed,
            pages: t.pages,
        }
    }

    /// Process exit status for an operator run: `0` when the run completed
    /// with no failures, `1` when any record failed, `2` when it aborted.
    pub fn exit_code(&self) -> u8 {
        match self.state {
            JobState::Completed if self.failed_count == 0 => 0,
            JobState::Completed => 1,
            JobState::NotStarted | JobState::Running | JobState::Aborted => 2,
        }
    }

    /// Snapshot as a serialisable report.
    pub fn summary(&self) -> RotationSummary {
        RotationSummary {
            run_id: self.run_id,
            state: self.state.as_str().to_owned(),
            dry_run: self.dry_run,
            chunk_size: self.chunk_size,
            processed_count: self.processed_count,
            failed_count: self.failed_count,
            failed_records: self.failed_records.clone(),
            kinds: self
                .target_types
                .iter()
                .map(|k| self.kind_summary(*k))
                .collect(),
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }

    pub(crate) fn start(&mut self) {
        self.state = JobState::Running;
        self.started_at = Utc::now();
    }

    pub(crate) fn complete(&mut self) {
        self.state = JobState::Completed;
        self.finished_at = Some(Utc::now());
    }

    pub(crate) fn abort(&mut self) {
        self.state = JobState::Aborted;
        self.finished_at = Some(Utc::now());
    }

    pub(crate) fn record_page(&mut self, kind: RecordKind) {
        self.tallies.entry(kind).or_default().pages += 1;
    }

    pub(crate) fn record_success(&mut self, kind: RecordKind) {
        self.tallies.entry(kind).or_default().processed += 1;
        self.processed_count += 1;
    }

    pub(crate) fn record_failure(&mut self, kind: RecordKind, id: i64, error: &RotationRecordError) {
        self.tallies.entry(kind).or_default().failed += 1;
        self.failed_count += 1;
        self.failed_records.push(FailedRecord {
            kind: kind.name().to_owned(),
            id,
            error: error.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;

    fn job() -> RotationJob {
        RotationJob::new(&RotationOptions::default())
    }

    #[test]
    fn new_job_is_not_started_and_empty() {
        let j = job();
        assert_eq!(j.state(), JobState::NotStarted);
        assert_eq!(j.processed_count(), 0);
        assert_eq!(j.target_types(), &RecordKind::ALL);
        assert!(j.summary().finished_at.is_none());
    }

    #[test]
    fn tallies_per_kind_and_total() {
        let mut j = job();
        j.start();
        j.record_page(RecordKind::Customer);
        j.record_success(RecordKind::Customer);
        j.record_success(RecordKind::Customer);
        j.record_failure(
            RecordKind::Address,
            7,
            &RotationRecordError::Storage(StoreError::Backend("disk full".into())),
        );
        j.complete();

        assert_eq!(j.processed_count(), 2);
        assert_eq!(j.failed_count(), 1);
        assert_eq!(j.failed_record_ids(), vec![7]);
        assert_eq!(j.seen(RecordKind::Customer), 2);
        let s = j.summary();
        assert_eq!(s.state, "completed");
        assert_eq!(s.kinds.len(), 3);
        assert_eq!(s.kinds[0].processed, 2);
        assert_eq!(s.kinds[0].pages, 1);
        assert_eq!(s.kinds[1].failed, 1);
        assert_eq!(s.failed_records[0].kind, "address");
        assert!(s.failed_records[0].error.contains("disk full"));
    }

    #[test]
    fn exit_codes() {
        let mut clean = job();
        clean.start();
        clean.complete();
        assert_eq!(clean.exit_code(), 0);

        let mut failed = job();
        failed.start();
        failed.record_failure(
            RecordKind::Customer,
            1,
            &RotationRecordError::Storage(StoreError::Backend("x".into())),
        );
        failed.complete();
        assert_eq!(failed.exit_code(), 1);

        let mut aborted = job();
        aborted.abort();
        assert_eq!(aborted.exit_code(), 2);
    }
}
