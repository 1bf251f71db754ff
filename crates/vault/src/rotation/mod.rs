//! Batch re-encryption of every encrypted field from an old key to a new one.
//!
//! The runner pages through each record kind in id order, moves every field of
//! a record from the old key to the new key, and saves the record. A record
//! that cannot be rotated is counted and reported; it never stops the run. Only
//! a missing key or a failed page read aborts.

pub mod job;
pub mod runner;

pub use job::{JobState, RotationJob};
pub use runner::{NoopObserver, RotationBatchRunner, RotationObserver, RotationOptions};

use common::ConfigurationError;
use thiserror::Error;

use crate::attribute::ReencryptError;
use crate::record::RecordKind;
use crate::store::StoreError;

/// Why one record could not be rotated. Never carries field content.
#[derive(Debug, Error)]
pub enum RotationRecordError {
    #[error("field {field}: {source}")]
    Field {
        field: &'static str,
        source: ReencryptError,
    },

    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// Conditions that abort a whole run.
#[derive(Debug, Error)]
pub enum RotationError {
    /// A required key is missing or the options are unusable. Nothing was
    /// touched.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// A page of records could not be loaded; the scan stopped there.
    #[error("failed to read {kind} records after id {after_id:?}: {source}")]
    PageRead {
        kind: RecordKind,
        after_id: Option<i64>,
        source: StoreError,
    },
}

impl RotationError {
    /// Process exit status for an operator run that stopped on this error.
    pub fn exit_code(&self) -> u8 {
        2
    }
}
