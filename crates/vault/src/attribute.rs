//! Transparent encrypt-on-write / decrypt-on-read accessor for one logical field.
//!
//! A field is persisted as two columns: the value (`<field>`, nullable text)
//! and a flag (`<field>_encrypted`). [`StoredField`] is the in-memory form of
//! that pair. It never performs I/O and never caches plaintext; every read
//! decrypts again so a key change is observed on the next access.

use common::{DecryptionError, EncryptionError};
use tracing::warn;

use crate::crypto::{self, CiphertextToken, KeyMaterial, TokenVersion};

/// What the stored string is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldState {
    /// Legacy data written before encryption; read verbatim.
    Plaintext,
    /// A ciphertext token of the given version.
    Encrypted(TokenVersion),
}

/// Result of a tolerant read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldRead {
    /// Nothing stored.
    Empty,
    /// The plaintext value.
    Value(String),
    /// Stored ciphertext could not be decrypted; the field is shown as
    /// unavailable instead of failing the whole record.
    Unavailable,
}

impl FieldRead {
    /// The value, if one was readable.
    pub fn value(&self) -> Option<&str> {
        match self {
            FieldRead::Value(v) => Some(v),
            FieldRead::Empty | FieldRead::Unavailable => None,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, FieldRead::Unavailable)
    }

    /// Render for display: the value, blank when empty, `placeholder` when
    /// unavailable.
    pub fn display_or<'a>(&'a self, placeholder: &'a str) -> &'a str {
        match self {
            FieldRead::Value(v) => v,
            FieldRead::Empty => "",
            FieldRead::Unavailable => placeholder,
        }
    }
}

/// In-memory form of a field's value and flag columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredField {
    value: Option<String>,
    state: FieldState,
}

impl Default for StoredField {
    fn default() -> Self {
        Self::empty()
    }
}

impl StoredField {
    /// A field with nothing stored.
    pub fn empty() -> Self {
        Self {
            value: None,
            state: FieldState::Plaintext,
        }
    }

    /// A legacy plaintext value.
    pub fn legacy(value: impl Into<String>) -> Self {
        Self::from_columns(Some(value.into()), false)
    }

    /// Build from the raw column pair as loaded from storage.
    ///
    /// A flagged value whose version prefix is unknown is still treated as
    /// ciphertext (tagged with the current version); reading it fails closed
    /// with the codec's own error.
    pub fn from_columns(value: Option<String>, is_encrypted: bool) -> Self {
        let value = value.filter(|v| !v.is_empty());
        let state = if is_encrypted && value.is_some() {
            FieldState::Encrypted(
                value
                    .as_deref()
                    .and_then(version_of)
                    .unwrap_or(TokenVersion::CURRENT),
            )
        } else {
            FieldState::Plaintext
        };
        Self { value, state }
    }

    /// The raw column pair to persist: `(value, is_encrypted)`.
    pub fn to_columns(&self) -> (Option<&str>, bool) {
        (
            self.value.as_deref(),
            matches!(self.state, FieldState::Encrypted(_)),
        )
    }

    pub fn state(&self) -> FieldState {
        self.state
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_none()
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self.state, FieldState::Encrypted(_))
    }

    /// Read strictly: empty is `Ok(None)`, legacy plaintext is returned
    /// verbatim without touching the codec, ciphertext is decrypted with `key`.
    ///
    /// # Errors
    ///
    /// Any [`DecryptionError`] from the codec.
    pub fn try_read(&self, key: &KeyMaterial) -> Result<Option<String>, DecryptionError> {
        let Some(stored) = self.value.as_deref() else {
            return Ok(None);
        };
        match self.state {
            FieldState::Plaintext => Ok(Some(stored.to_owned())),
            FieldState::Encrypted(_) => crypto::decrypt_str(stored, key).map(Some),
        }
    }

    /// Read tolerantly: a decryption failure degrades to
    /// [`FieldRead::Unavailable`] and is logged without any field content.
    pub fn read(&self, key: &KeyMaterial) -> FieldRead {
        match self.try_read(key) {
            Ok(Some(v)) => FieldRead::Value(v),
            Ok(None) => FieldRead::Empty,
            Err(e) => {
                warn!(error = %e, "encrypted field unavailable");
                FieldRead::Unavailable
            }
        }
    }

    /// Write a new value. Empty or `None` clears the field and resets the flag;
    /// anything else is encrypted with `key`.
    ///
    /// On error the field is left exactly as it was.
    ///
    /// # Errors
    ///
    /// [`EncryptionError`] from the codec.
    pub fn write(&mut self, value: Option<&str>, key: &KeyMaterial) -> Result<(), EncryptionError> {
        let token = match value {
            Some(v) => crypto::encrypt(v, key)?,
            None => None,
        };
        self.set_token(token);
        Ok(())
    }

    /// Move this field from `old` to `new`: read under `old`, write under `new`.
    ///
    /// Legacy plaintext is encrypted under `new`; an empty field stays empty.
    /// On error the field is left exactly as it was.
    ///
    /// # Errors
    ///
    /// [`ReencryptError`] naming which half failed.
    pub fn reencrypt(&mut self, old: &KeyMaterial, new: &KeyMaterial) -> Result<(), ReencryptError> {
        let plaintext = self.try_read(old).map_err(ReencryptError::Decrypt)?;
        let token = match plaintext.as_deref() {
            Some(v) => crypto::encrypt(v, new).map_err(ReencryptError::Encrypt)?,
            None => None,
        };
        self.set_token(token);
        Ok(())
    }

    fn set_token(&mut self, token: Option<CiphertextToken>) {
        match token {
            Some(t) => {
                self.state = FieldState::Encrypted(t.version());
                self.value = Some(t.to_string_repr());
            }
            None => {
                self.state = FieldState::Plaintext;
                self.value = None;
            }
        }
    }
}

/// Failure while moving a single field between keys.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ReencryptError {
    /// The value could not be read under the old key.
    #[error("decrypt under old key failed: {0}")]
    Decrypt(DecryptionError),
    /// The value could not be written under the new key.
    #[error("encrypt under new key failed: {0}")]
    Encrypt(EncryptionError),
}

fn version_of(token: &str) -> Option<TokenVersion> {
    token.split('.').next().and_then(TokenVersion::from_prefix)
}
