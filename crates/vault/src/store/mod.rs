//! Storage seam for records that own encrypted fields.
//!
//! The [`RecordStore`] trait is the only interface the rotation runner and
//! application code use to load and persist records. Backends:
//!
//! - [`SqliteStore`]: `rusqlite`, one table per [`RecordKind`].
//! - [`MemoryStore`]: in-process maps, for tests and embedding.
//!
//! All backends must ensure:
//! - A record's value and flag columns are written in the same statement.
//! - [`RecordStore::save`] is an optimistic compare-and-swap on the record's
//!   revision, so a write based on a stale read is rejected instead of
//!   silently overwriting a concurrent change.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use thiserror::Error;

use crate::record::{Record, RecordKind};

/// Errors produced by storage backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The stored revision no longer matches the one the record was read at.
    #[error("{kind} {id} changed since it was read (expected revision {expected})")]
    Conflict {
        /// Record kind.
        kind: RecordKind,
        /// Record id.
        id: i64,
        /// Revision the caller held.
        expected: i64,
    },

    /// No record with this id exists.
    #[error("{kind} {id} not found")]
    NotFound {
        /// Record kind.
        kind: RecordKind,
        /// Record id.
        id: i64,
    },

    /// Underlying backend failure.
    #[error("storage error: {0}")]
    Backend(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// Inclusive id window. `None` bounds are open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdRange {
    /// Smallest id included.
    pub start: Option<i64>,
    /// Largest id included.
    pub end: Option<i64>,
}

impl IdRange {
    /// Every id.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn new(start: Option<i64>, end: Option<i64>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, id: i64) -> bool {
        self.start.map_or(true, |s| id >= s) && self.end.map_or(true, |e| id <= e)
    }

    /// Exclusive lower bound for a keyset page that resumes after `after_id`.
    pub(crate) fn lower_exclusive(&self, after_id: Option<i64>) -> i64 {
        let from_range = self.start.map_or(i64::MIN, |s| s.saturating_sub(1));
        after_id.map_or(from_range, |a| a.max(from_range))
    }

    pub(crate) fn upper_inclusive(&self) -> i64 {
        self.end.unwrap_or(i64::MAX)
    }
}

/// Persistence interface for records with encrypted fields.
#[cfg_attr(test, mockall::automock)]
pub trait RecordStore: Send + Sync {
    /// Insert a new record and return it with its assigned id and revision.
    fn insert(&self, record: &Record) -> Result<Record, StoreError>;

    /// Load one record.
    ///
    /// Returns `Ok(None)` if no such record exists.
    fn get(&self, kind: RecordKind, id: i64) -> Result<Option<Record>, StoreError>;

    /// Load up to `limit` records of `kind` with ids strictly greater than
    /// `after_id` (or from the start of `range` when `None`) and within
    /// `range`, in ascending id order.
    ///
    /// Keyset pagination: pages stay stable while earlier records are updated.
    fn page(
        &self,
        kind: RecordKind,
        after_id: Option<i64>,
        range: IdRange,
        limit: usize,
    ) -> Result<Vec<Record>, StoreError>;

    /// Persist every field of `record` in one write, provided the stored
    /// revision still equals `record.revision()`. On success the record's
    /// revision is advanced to the stored one.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Conflict`] if the record changed since it was read.
    /// - [`StoreError::NotFound`] if it no longer exists.
    fn save(&self, record: &mut Record) -> Result<(), StoreError>;

    /// Number of records of `kind` within `range`.
    fn count(&self, kind: RecordKind, range: IdRange) -> Result<u64, StoreError>;
}
