//! Record types that own encrypted fields, and the accessors application code
//! uses to read and write them.
//!
//! Application code never touches the value or flag columns directly: it goes
//! through [`Record::read`] / [`Record::write`] (or the active-key variants)
//! and then persists the whole record with a single
//! [`RecordStore::save`](crate::store::RecordStore::save) call, so a field's
//! ciphertext and its flag are always written together.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use common::{ConfigurationError, EncryptionError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::attribute::{FieldRead, ReencryptError, StoredField};
use crate::crypto::KeyMaterial;
use crate::keys::KeyStore;

/// Record types that carry encrypted fields.
///
/// Declaration order is the fixed order rotation processes and reports them in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// End-user account.
    Customer,
    /// Delivery address belonging to a customer.
    Address,
    /// Registered business and its contact person.
    Restaurant,
}

impl RecordKind {
    /// Every kind, in processing order.
    pub const ALL: [RecordKind; 3] = [RecordKind::Customer, RecordKind::Address, RecordKind::Restaurant];

    pub fn name(self) -> &'static str {
        match self {
            RecordKind::Customer => "customer",
            RecordKind::Address => "address",
            RecordKind::Restaurant => "restaurant",
        }
    }

    /// Backing table name.
    pub fn table(self) -> &'static str {
        match self {
            RecordKind::Customer => "customers",
            RecordKind::Address => "addresses",
            RecordKind::Restaurant => "restaurants",
        }
    }

    /// Names of the encrypted fields on this kind. Each maps to a `<name>`
    /// value column and a `<name>_encrypted` flag column.
    pub fn encrypted_fields(self) -> &'static [&'static str] {
        match self {
            RecordKind::Customer => &["first_name", "last_name", "email", "phone"],
            RecordKind::Address => &["recipient_name", "street", "city", "postcode", "phone"],
            RecordKind::Restaurant => &["owner_name", "contact_email", "contact_phone", "street_address"],
        }
    }

    fn field_name(self, name: &str) -> Option<&'static str> {
        self.encrypted_fields().iter().copied().find(|f| *f == name)
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The string did not name a known [`RecordKind`].
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown record type: {0}")]
pub struct UnknownKind(pub String);

impl FromStr for RecordKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RecordKind::ALL
            .into_iter()
            .find(|k| k.name() == s)
            .ok_or_else(|| UnknownKind(s.to_owned()))
    }
}

/// Errors from record-level field access.
#[derive(Debug, Error)]
pub enum RecordError {
    /// The field is not one of the kind's encrypted fields.
    #[error("{kind} has no encrypted field named {field}")]
    UnknownField {
        /// Record kind.
        kind: RecordKind,
        /// Field asked for.
        field: String,
    },

    /// No active key is installed.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// The new value could not be encrypted; the record is unchanged.
    #[error("failed to encrypt {field}: {source}")]
    Encryption {
        /// Field being written.
        field: &'static str,
        /// Codec error.
        source: EncryptionError,
    },
}

/// A persisted row: identity, optimistic-concurrency revision and its
/// encrypted fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    kind: RecordKind,
    id: i64,
    revision: i64,
    fields: BTreeMap<&'static str, StoredField>,
}

impl Record {
    /// A new, unsaved record with every field empty.
    pub fn new(kind: RecordKind) -> Self {
        Self::from_parts(kind, 0, 0, BTreeMap::new())
    }

    /// Assemble a record loaded from storage. Fields missing from `fields`
    /// are empty.
    pub fn from_parts(
        kind: RecordKind,
        id: i64,
        revision: i64,
        mut fields: BTreeMap<&'static str, StoredField>,
    ) -> Self {
        for name in kind.encrypted_fields() {
            fields.entry(*name).or_default();
        }
        fields.retain(|name, _| kind.field_name(name).is_some());
        Self {
            kind,
            id,
            revision,
            fields,
        }
    }

    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    /// Primary key; `0` until the record has been inserted.
    pub fn id(&self) -> i64 {
        self.id
    }

    /// Revision the record was loaded at. Saving fails if the stored revision
    /// has moved on since.
    pub fn revision(&self) -> i64 {
        self.revision
    }

    pub(crate) fn set_identity(&mut self, id: i64, revision: i64) {
        self.id = id;
        self.revision = revision;
    }

    /// Every field in schema-independent (alphabetical) order.
    pub fn fields(&self) -> impl Iterator<Item = (&'static str, &StoredField)> {
        self.fields.iter().map(|(k, v)| (*k, v))
    }

    /// Borrow one stored field.
    ///
    /// # Errors
    ///
    /// [`RecordError::UnknownField`] if `name` is not an encrypted field of this kind.
    pub fn field(&self, name: &str) -> Result<&StoredField, RecordError> {
        self.fields.get(name).ok_or_else(|| self.unknown(name))
    }

    /// Read one field with `key`, degrading a decryption failure to
    /// [`FieldRead::Unavailable`].
    ///
    /// # Errors
    ///
    /// [`RecordError::UnknownField`] only.
    pub fn read(&self, name: &str, key: &KeyMaterial) -> Result<FieldRead, RecordError> {
        Ok(self.field(name)?.read(key))
    }

    /// Read every field. A field that cannot be decrypted is reported as
    /// unavailable without affecting the others.
    pub fn read_all(&self, key: &KeyMaterial) -> BTreeMap<&'static str, FieldRead> {
        self.fields
            .iter()
            .map(|(name, field)| (*name, field.read(key)))
            .collect()
    }

    /// Encrypt `value` into field `name` with `key`. `None` or an empty string
    /// clears the field.
    ///
    /// # Errors
    ///
    /// [`RecordError::UnknownField`] or [`RecordError::Encryption`]; the record
    /// is unchanged on error.
    pub fn write(&mut self, name: &str, value: Option<&str>, key: &KeyMaterial) -> Result<(), RecordError> {
        let kind = self.kind;
        let field_name = kind.field_name(name).ok_or_else(|| self.unknown(name))?;
        let field = self.fields.entry(field_name).or_default();
        field.write(value, key).map_err(|source| RecordError::Encryption {
            field: field_name,
            source,
        })
    }

    /// [`Record::read`] with the process's active key.
    ///
    /// # Errors
    ///
    /// [`RecordError::Configuration`] if no key is installed, or
    /// [`RecordError::UnknownField`].
    pub fn read_active(&self, name: &str, keys: &KeyStore) -> Result<FieldRead, RecordError> {
        let material = keys.current()?;
        self.read(name, material.key())
    }

    /// [`Record::write`] with the process's active key.
    ///
    /// # Errors
    ///
    /// As [`Record::write`], plus [`RecordError::Configuration`] if no key is installed.
    pub fn write_active(&mut self, name: &str, value: Option<&str>, keys: &KeyStore) -> Result<(), RecordError> {
        let material = keys.current()?;
        self.write(name, value, material.key())
    }

    /// Move every field from `old` to `new`.
    ///
    /// All-or-nothing: if any field fails, no field is changed and the failing
    /// field's name is returned with the error.
    ///
    /// # Errors
    ///
    /// `(field, ReencryptError)` for the first field that failed.
    pub fn reencrypt(&mut self, old: &KeyMaterial, new: &KeyMaterial) -> Result<(), (&'static str, ReencryptError)> {
        let mut staged = self.fields.clone();
        for (name, field) in staged.iter_mut() {
            field.reencrypt(old, new).map_err(|e| (*name, e))?;
        }
        self.fields = staged;
        Ok(())
    }

    fn unknown(&self, name: &str) -> RecordError {
        RecordError::UnknownField {
            kind: self.kind,
            field: name.to_owned(),
        }
    }
}
