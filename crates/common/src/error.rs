//! Error taxonomy shared across crates.
//!
//! | Type | Scope | Recoverable |
//! |---|---|---|
//! | [`ConfigurationError`] | process or rotation job | no, aborts before any record is touched |
//! | [`DecryptionError`] | single field | yes, the caller degrades that field |
//! | [`EncryptionError`] | single write | yes, the write is rejected |
//!
//! None of these errors carry plaintext, ciphertext or key bytes in their
//! `Display` output.

use thiserror::Error;

/// Which side of a rotation a missing key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRole {
    /// The key currently protecting stored ciphertext.
    Old,
    /// The key stored ciphertext is being moved to.
    New,
    /// The key the process uses for ordinary reads and writes.
    Active,
}

impl std::fmt::Display for KeyRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyRole::Old => f.write_str("old"),
            KeyRole::New => f.write_str("new"),
            KeyRole::Active => f.write_str("active"),
        }
    }
}

/// Fatal configuration problems. Never caught per record.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    /// The root secret is absent or blank.
    #[error("root secret is required and must not be empty")]
    MissingSecret,

    /// The salt is absent or blank.
    #[error("salt is required and must not be empty")]
    MissingSalt,

    /// The requested PBKDF2 iteration count is below the hard minimum.
    #[error("iteration count {requested} is below the minimum of {minimum}")]
    IterationsTooLow {
        /// Iterations asked for.
        requested: u32,
        /// Enforced floor.
        minimum: u32,
    },

    /// Key material required by an operation has not been provided.
    #[error("{0} key material is unavailable")]
    KeyUnavailable(KeyRole),

    /// Any other invalid setting, named by its variable.
    #[error("invalid setting {name}: {reason}")]
    Invalid {
        /// Setting name.
        name: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

/// Reasons a ciphertext token could not be turned back into plaintext.
///
/// Every variant fails closed: no partial plaintext is ever returned.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecryptionError {
    /// The token is not `<version>.<nonce>.<payload>` with valid base64 parts.
    #[error("malformed ciphertext token")]
    Malformed,

    /// The token names a version this build cannot decode.
    #[error("unsupported ciphertext version: {0}")]
    UnsupportedVersion(String),

    /// Authentication tag mismatch: wrong key or tampered data.
    #[error("ciphertext authentication failed")]
    Authentication,

    /// The payload authenticated but is not valid UTF-8.
    #[error("decrypted payload is not valid UTF-8")]
    InvalidUtf8,
}

/// Failures on the write path. The record must not be saved with a partial field.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncryptionError {
    /// The AEAD primitive reported an internal failure.
    #[error("aead encryption failed")]
    Aead,
}
