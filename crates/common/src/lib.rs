//! Error taxonomy and report types shared across `pii-vault` crates.

pub mod error;
pub mod protocol;

pub use error::{ConfigurationError, DecryptionError, EncryptionError, KeyRole};
pub use protocol::{FailedRecord, KindSummary, RotationSummary};
