//! `pii-vault`: transparent field-level encryption for personal data columns.
//!
//! Layers, bottom-up:
//! 1. [`crypto`]: PBKDF2 key derivation and the AES-256-GCM-SIV token codec.
//! 2. [`keys`]: the process-wide active key, installed once at startup.
//! 3. [`attribute`]: one logical field stored as a value column plus an
//!    `_encrypted` flag, encrypted on write and decrypted on read.
//! 4. [`record`]: the record kinds and which of their fields are encrypted.
//! 5. [`store`]: persistence with keyset pagination and optimistic writes.
//! 6. [`rotation`]: the batch runner that moves every field to a new key.

pub mod attribute;
pub mod config;
pub mod crypto;
pub mod keys;
pub mod record;
pub mod rotation;
pub mod store;

pub use attribute::{FieldRead, FieldState, ReencryptError, StoredField};
pub use config::VaultConfig;
pub use crypto::{KeyMaterial, SecretMaterial};
pub use keys::KeyStore;
pub use record::{Record, RecordError, RecordKind};
pub use rotation::{
    JobState, RotationBatchRunner, RotationError, RotationJob, RotationObserver, RotationOptions,
};
pub use store::{IdRange, MemoryStore, RecordStore, SqliteStore, StoreError};
