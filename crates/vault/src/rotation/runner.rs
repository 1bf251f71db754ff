//! [`RotationBatchRunner`] and the options and observer hooks it runs with.

use common::{ConfigurationError, KeyRole, KindSummary};
use tracing::{error, info, warn};

use super::{RotationError, RotationJob, RotationRecordError};
use crate::crypto::KeyMaterial;
use crate::record::{Record, RecordKind};
use crate::store::{IdRange, RecordStore};

/// Records loaded per page when not overridden.
pub const DEFAULT_CHUNK_SIZE: usize = 100;

/// Records between progress reports when not overridden.
pub const DEFAULT_PROGRESS_EVERY: u64 = 100;

/// Tuning for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationOptions {
    /// Kinds to rotate. Processed in [`RecordKind`] order regardless of the
    /// order given here.
    pub targets: Vec<RecordKind>,
    /// Records loaded per page. Must be positive.
    pub chunk_size: usize,
    /// Re-encrypt in memory and count, but never save.
    pub dry_run: bool,
    /// Only records whose id falls within this range.
    pub id_range: IdRange,
    /// Report progress every this many records per kind. Must be positive.
    pub progress_every: u64,
}

impl Default for RotationOptions {
    fn default() -> Self {
        Self {
            targets: RecordKind::ALL.to_vec(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            dry_run: false,
            id_range: IdRange::all(),
            progress_every: DEFAULT_PROGRESS_EVERY,
        }
    }
}

impl RotationOptions {
    /// Targets sorted and de-duplicated.
    pub fn normalized_targets(&self) -> Vec<RecordKind> {
        let mut targets = self.targets.clone();
        targets.sort();
        targets.dedup();
        targets
    }

    /// # Errors
    ///
    /// [`ConfigurationError::Invalid`] for an empty target list, a zero chunk
    /// size, zero progress interval or an inverted id range.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.targets.is_empty() {
            return Err(invalid("targets", "at least one record type is required"));
        }
        if self.chunk_size == 0 {
            return Err(invalid("chunk_size", "must be greater than zero"));
        }
        if self.progress_every == 0 {
            return Err(invalid("progress_every", "must be greater than zero"));
        }
        if let (Some(start), Some(end)) = (self.id_range.start, self.id_range.end) {
            if start > end {
                return Err(invalid("id_range", "start id is greater than end id"));
            }
        }
        Ok(())
    }
}

fn invalid(name: &'static str, reason: &str) -> ConfigurationError {
    ConfigurationError::Invalid {
        name,
        reason: reason.to_owned(),
    }
}

/// Receives progress while a run is in flight.
pub trait RotationObserver {
    /// Called every `progress_every` records within a kind.
    fn on_progress(&mut self, _kind: RecordKind, _processed: u64, _failed: u64) {}

    /// Called once per kind after its last page.
    fn on_kind_finished(&mut self, _summary: &KindSummary) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl RotationObserver for NoopObserver {}

/// Moves every encrypted field in a [`RecordStore`] from one key to another.
///
/// Keys are passed explicitly. The runner never consults the process-wide
/// [`KeyStore`](crate::keys::KeyStore), so web traffic using the active key is
/// unaffected while a rotation is in progress.
pub struct RotationBatchRunner<'a> {
    store: &'a dyn RecordStore,
    old_key: Option<KeyMaterial>,
    new_key: Option<KeyMaterial>,
    options: RotationOptions,
}

impl<'a> RotationBatchRunner<'a> {
    pub fn new(
        store: &'a dyn RecordStore,
        old_key: Option<KeyMaterial>,
        new_key: Option<KeyMaterial>,
        options: RotationOptions,
    ) -> Self {
        Self {
            store,
            old_key,
            new_key,
            options,
        }
    }

    pub fn options(&self) -> &RotationOptions {
        &self.options
    }

    /// A fresh job for this runner's options.
    pub fn new_job(&self) -> RotationJob {
        RotationJob::new(&self.options)
    }

    /// Create a job and run it, discarding progress notifications.
    ///
    /// On error the partially filled job is dropped; use [`run`](Self::run)
    /// to keep it.
    ///
    /// # Errors
    ///
    /// See [`run`](Self::run).
    pub fn run_to_end(&self) -> Result<RotationJob, RotationError> {
        let mut job = self.new_job();
        self.run(&mut job, &mut NoopObserver)?;
        Ok(job)
    }

    /// Execute `job`. The job ends in [`JobState::Completed`] on `Ok` and in
    /// [`JobState::Aborted`] on `Err`; in both cases its counters reflect every
    /// record handled before returning.
    ///
    /// # Errors
    ///
    /// - [`RotationError::Configuration`] if either key is missing or the
    ///   options are invalid. No record is read.
    /// - [`RotationError::PageRead`] if a page cannot be loaded. Records
    ///   already saved keep their new ciphertext.
    ///
    /// [`JobState::Completed`]: super::JobState::Completed
    /// [`JobState::Aborted`]: super::JobState::Aborted
    pub fn run(
        &self,
        job: &mut RotationJob,
        observer: &mut dyn RotationObserver,
    ) -> Result<(), RotationError> {
        let (old, new) = match self.keys() {
            Ok(keys) => keys,
            Err(e) => {
                error!(run_id = %job.run_id(), error = %e, "rotation precondition failed");
                job.abort();
                return Err(e.into());
            }
        };
        if let Err(e) = self.options.validate() {
            error!(run_id = %job.run_id(), error = %e, "rotation options rejected");
            job.abort();
            return Err(e.into());
        }

        info!(
            run_id = %job.run_id(),
            old_key = %old.fingerprint(),
            new_key = %new.fingerprint(),
            chunk_size = self.options.chunk_size,
            dry_run = self.options.dry_run,
            "rotation started"
        );
        job.start();

        for kind in job.target_types().to_vec() {
            if let Err(e) = self.rotate_kind(kind, old, new, job, observer) {
                error!(run_id = %job.run_id(), error = %e, "rotation aborted");
                job.abort();
                return Err(e);
            }
            observer.on_kind_finished(&job.kind_summary(kind));
        }

        job.complete();
        info!(
            run_id = %job.run_id(),
            processed = job.processed_count(),
            failed = job.failed_count(),
            "rotation completed"
        );
        Ok(())
    }

    fn keys(&self) -> Result<(&KeyMaterial, &KeyMaterial), ConfigurationError> {
        let old = self
            .old_key
            .as_ref()
            .ok_or(ConfigurationError::KeyUnavailable(KeyRole::Old))?;
        let new = self
            .new_key
            .as_ref()
            .ok_or(ConfigurationError::KeyUnavailable(KeyRole::New))?;
        Ok((old, new))
    }

    fn rotate_kind(
        &self,
        kind: RecordKind,
        old: &KeyMaterial,
        new: &KeyMaterial,
        job: &mut RotationJob,
        observer: &mut dyn RotationObserver,
    ) -> Result<(), RotationError> {
        let chunk = self.options.chunk_size;
        let mut after_id = None;

        loop {
            let page = self
                .store
                .page(kind, after_id, self.options.id_range, chunk)
                .map_err(|source| RotationError::PageRead {
                    kind,
                    after_id,
                    source,
                })?;
            if page.is_empty() {
                break;
            }
            job.record_page(kind);
            let full_page = page.len() >= chunk;

            for mut record in page {
                let id = record.id();
                after_id = Some(id);
                match self.rotate_record(&mut record, old, new) {
                    Ok(()) => job.record_success(kind),
                    Err(e) => {
                        warn!(kind = %kind, record_id = id, error = %e, "record rotation failed");
                        job.record_failure(kind, id, &e);
                    }
                }

                let seen = job.seen(kind);
                if seen % self.options.progress_every == 0 {
                    let s = job.kind_summary(kind);
                    info!(kind = %kind, processed = s.processed, failed = s.failed, "rotation progress");
                    observer.on_progress(kind, s.processed, s.failed);
                }
            }

            if !full_page {
                break;
            }
        }
        Ok(())
    }

    fn rotate_record(
        &self,
        record: &mut Record,
        old: &KeyMaterial,
        new: &KeyMaterial,
    ) -> Result<(), RotationRecordError> {
        record
            .reencrypt(old, new)
            .map_err(|(field, source)| RotationRecordError::Field { field, source })?;
        if !self.options.dry_run {
            self.store.save(record)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use mockall::predicate::eq;

    use super::*;
    use crate::crypto::KEY_LEN;
    use crate::rotation::JobState;
    use crate::store::{MockRecordStore, StoreError};

    fn key(b: u8) -> KeyMaterial {
        KeyMaterial::from_bytes([b; KEY_LEN])
    }

    fn customer(id: i64, email: &str, k: &KeyMaterial) -> Record {
        let mut r = Record::new(RecordKind::Customer);
        r.set_identity(id, 1);
        r.write("email", Some(email), k).unwrap();
        r
    }

    fn customers_only() -> RotationOptions {
        RotationOptions {
            targets: vec![RecordKind::Customer],
            ..RotationOptions::default()
        }
    }

    #[derive(Default)]
    struct Recorder {
        progress: Vec<(RecordKind, u64, u64)>,
        finished: Vec<KindSummary>,
    }

    impl RotationObserver for Recorder {
        fn on_progress(&mut self, kind: RecordKind, processed: u64, failed: u64) {
            self.progress.push((kind, processed, failed));
        }

        fn on_kind_finished(&mut self, summary: &KindSummary) {
            self.finished.push(summary.clone());
        }
    }

    #[test]
    fn missing_new_key_aborts_without_reading() {
        let mut store = MockRecordStore::new();
        store.expect_page().never();
        store.expect_save().never();

        let runner = RotationBatchRunner::new(&store, Some(key(1)), None, RotationOptions::default());
        let mut job = runner.new_job();
        let err = runner.run(&mut job, &mut NoopObserver).unwrap_err();

        assert!(matches!(
            err,
            RotationError::Configuration(ConfigurationError::KeyUnavailable(KeyRole::New))
        ));
        assert_eq!(job.state(), JobState::Aborted);
        assert_eq!(job.processed_count(), 0);
        assert_eq!(job.exit_code(), 2);
    }

    #[test]
    fn missing_old_key_reported_as_old() {
        let store = MockRecordStore::new();
        let runner = RotationBatchRunner::new(&store, None, Some(key(2)), RotationOptions::default());
        assert!(matches!(
            runner.run_to_end().unwrap_err(),
            RotationError::Configuration(ConfigurationError::KeyUnavailable(KeyRole::Old))
        ));
    }

    #[test]
    fn zero_chunk_size_rejected() {
        let store = MockRecordStore::new();
        let opts = RotationOptions {
            chunk_size: 0,
            ..RotationOptions::default()
        };
        let runner = RotationBatchRunner::new(&store, Some(key(1)), Some(key(2)), opts);
        assert!(matches!(
            runner.run_to_end().unwrap_err(),
            RotationError::Configuration(ConfigurationError::Invalid { name: "chunk_size", .. })
        ));
    }

    #[test]
    fn save_failure_is_counted_and_the_run_continues() {
        let old = key(1);
        let page = vec![
            customer(1, "a@example.com", &old),
            customer(2, "b@example.com", &old),
            customer(3, "c@example.com", &old),
        ];

        let mut store = MockRecordStore::new();
        store
            .expect_page()
            .with(eq(RecordKind::Customer), eq(None::<i64>), eq(IdRange::all()), eq(100usize))
            .times(1)
            .return_once(move |_, _, _, _| Ok(page));
        store.expect_save().times(3).returning(|r| {
            if r.id() == 2 {
                Err(StoreError::Conflict {
                    kind: r.kind(),
                    id: r.id(),
                    expected: r.revision(),
                })
            } else {
                Ok(())
            }
        });

        let runner = RotationBatchRunner::new(&store, Some(old), Some(key(2)), customers_only());
        let job = runner.run_to_end().unwrap();

        assert_eq!(job.state(), JobState::Completed);
        assert_eq!(job.processed_count(), 2);
        assert_eq!(job.failed_count(), 1);
        assert_eq!(job.failed_record_ids(), vec![2]);
        assert!(job.failed_records()[0].error.contains("changed since it was read"));
        assert_eq!(job.exit_code(), 1);
    }

    #[test]
    fn page_read_failure_aborts_with_partial_counts() {
        let old = key(1);
        let first = vec![customer(1, "a@example.com", &old), customer(2, "b@example.com", &old)];

        let mut store = MockRecordStore::new();
        store
            .expect_page()
            .with(eq(RecordKind::Customer), eq(None::<i64>), eq(IdRange::all()), eq(2usize))
            .return_once(move |_, _, _, _| Ok(first));
        store
            .expect_page()
            .with(eq(RecordKind::Customer), eq(Some(2i64)), eq(IdRange::all()), eq(2usize))
            .return_once(|_, _, _, _| Err(StoreError::Backend("connection reset".into())));
        store.expect_save().times(2).returning(|_| Ok(()));

        let opts = RotationOptions {
            chunk_size: 2,
            ..customers_only()
        };
        let runner = RotationBatchRunner::new(&store, Some(old), Some(key(2)), opts);
        let mut job = runner.new_job();
        let err = runner.run(&mut job, &mut NoopObserver).unwrap_err();

        assert!(matches!(err, RotationError::PageRead { after_id: Some(2), .. }));
        assert_eq!(job.state(), JobState::Aborted);
        assert_eq!(job.processed_count(), 2);
        assert_eq!(job.summary().state, "aborted");
    }

    #[test]
    fn dry_run_never_saves() {
        let old = key(1);
        let page = vec![customer(1, "a@example.com", &old)];
        let mut store = MockRecordStore::new();
        store.expect_page().return_once(move |_, _, _, _| Ok(page));
        store.expect_save().never();

        let opts = RotationOptions {
            dry_run: true,
            ..customers_only()
        };
        let runner = RotationBatchRunner::new(&store, Some(old), Some(key(2)), opts);
        let job = runner.run_to_end().unwrap();
        assert_eq!(job.processed_count(), 1);
        assert!(job.summary().dry_run);
    }

    #[test]
    fn undecryptable_record_is_reported_by_field() {
        let page = vec![customer(9, "a@example.com", &key(3))];
        let mut store = MockRecordStore::new();
        store.expect_page().return_once(move |_, _, _, _| Ok(page));
        store.expect_save().never();

        let runner = RotationBatchRunner::new(&store, Some(key(1)), Some(key(2)), customers_only());
        let job = runner.run_to_end().unwrap();
        assert_eq!(job.failed_record_ids(), vec![9]);
        let msg = &job.failed_records()[0].error;
        assert!(msg.contains("email"));
        assert!(!msg.contains("a@example.com"));
    }

    #[test]
    fn observer_sees_progress_and_kind_totals() {
        let old = key(1);
        let page: Vec<Record> = (1..=5)
            .map(|i| customer(i, "x@example.com", &old))
            .collect();
        let mut store = MockRecordStore::new();
        store.expect_page().return_once(move |_, _, _, _| Ok(page));
        store.expect_save().returning(|_| Ok(()));

        let opts = RotationOptions {
            progress_every: 2,
            ..customers_only()
        };
        let runner = RotationBatchRunner::new(&store, Some(old), Some(key(2)), opts);
        let mut job = runner.new_job();
        let mut seen = Recorder::default();
        runner.run(&mut job, &mut seen).unwrap();

        assert_eq!(
            seen.progress,
            vec![(RecordKind::Customer, 2, 0), (RecordKind::Customer, 4, 0)]
        );
        assert_eq!(seen.finished.len(), 1);
        assert_eq!(seen.finished[0].processed, 5);
        assert_eq!(seen.finished[0].pages, 1);
    }

    #[test]
    fn targets_are_processed_in_kind_order() {
        let opts = RotationOptions {
            targets: vec![RecordKind::Restaurant, RecordKind::Customer, RecordKind::Restaurant],
            ..RotationOptions::default()
        };
        assert_eq!(
            opts.normalized_targets(),
            vec![RecordKind::Customer, RecordKind::Restaurant]
        );
    }
}
