//! SQLite-backed [`RecordStore`].
//!
//! One table per [`RecordKind`]:
//!
//! ```text
//! id INTEGER PRIMARY KEY, revision INTEGER,
//! <field> TEXT, <field>_encrypted INTEGER, ...
//! ```
//!
//! Column and table names come only from the static schema in
//! [`RecordKind`]; values are always bound as parameters.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OpenFlags, OptionalExtension, Row};
use tracing::debug;

use super::{IdRange, RecordStore, StoreError};
use crate::attribute::StoredField;
use crate::record::{Record, RecordKind};

/// SQLite storage engine.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database file and bring its schema up to date.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the file cannot be opened or migrated.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::configure(Connection::open(path)?)
    }

    /// Open a database file that must already exist. Never creates one, so a
    /// mistyped path fails instead of yielding an empty database.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the file is missing, cannot be
    /// opened read-write, or cannot be migrated.
    pub fn open_existing(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(StoreError::Backend(format!(
                "database file {} does not exist",
                path.display()
            )));
        }
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        Self::configure(Connection::open_with_flags(path, flags)?)
    }

    fn configure(conn: Connection) -> Result<Self, StoreError> {
        let _mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Self::from_connection(conn)
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the schema cannot be created.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Lock the database connection, returning an error if the mutex is poisoned.
    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Backend("SQLite connection poisoned".to_string()))
    }
}

fn migrate(conn: &Connection) -> Result<(), StoreError> {
    for kind in RecordKind::ALL {
        let columns: Vec<String> = kind
            .encrypted_fields()
            .iter()
            .map(|f| format!("{f} TEXT, {f}_encrypted INTEGER NOT NULL DEFAULT 0"))
            .collect();
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                revision INTEGER NOT NULL DEFAULT 0,
                {}
            )",
            kind.table(),
            columns.join(",\n                ")
        );
        conn.execute(&sql, [])?;
        debug!(table = kind.table(), "schema ensured");
    }
    Ok(())
}

/// `id, revision, f1, f1_encrypted, f2, f2_encrypted, ...`
fn select_columns(kind: RecordKind) -> String {
    let mut cols = vec!["id".to_string(), "revision".to_string()];
    for f in kind.encrypted_fields() {
        cols.push((*f).to_string());
        cols.push(format!("{f}_encrypted"));
    }
    cols.join(", ")
}

/// Bound values for every field, in schema order: value then flag.
fn field_values(record: &Record) -> Result<Vec<Value>, StoreError> {
    let mut values = Vec::with_capacity(record.kind().encrypted_fields().len() * 2);
    for name in record.kind().encrypted_fields() {
        let field = record
            .field(name)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let (value, flag) = field.to_columns();
        values.push(value.map_or(Value::Null, |v| Value::Text(v.to_owned())));
        values.push(Value::Integer(i64::from(flag)));
    }
    Ok(values)
}

fn row_to_record(kind: RecordKind, row: &Row<'_>) -> rusqlite::Result<Record> {
    let id: i64 = row.get(0)?;
    let revision: i64 = row.get(1)?;
    let mut fields = BTreeMap::new();
    for (i, name) in kind.encrypted_fields().iter().enumerate() {
        let value: Option<String> = row.get(2 + 2 * i)?;
        let flag: bool = row.get(3 + 2 * i)?;
        fields.insert(*name, StoredField::from_columns(value, flag));
    }
    Ok(Record::from_parts(kind, id, revision, fields))
}

impl RecordStore for SqliteStore {
    fn insert(&self, record: &Record) -> Result<Record, StoreError> {
        let kind = record.kind();
        let fields = kind.encrypted_fields();
        let mut cols = Vec::with_capacity(fields.len() * 2);
        for f in fields {
            cols.push((*f).to_string());
            cols.push(format!("{f}_encrypted"));
        }
        let placeholders: Vec<String> = (1..=cols.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT INTO {} (revision, {}) VALUES (0, {})",
            kind.table(),
            cols.join(", "),
            placeholders.join(", ")
        );

        let values = field_values(record)?;
        let conn = self.lock_conn()?;
        conn.execute(&sql, params_from_iter(values.iter()))?;
        let id = conn.last_insert_rowid();

        let mut stored = record.clone();
        stored.set_identity(id, 0);
        Ok(stored)
    }

    fn get(&self, kind: RecordKind, id: i64) -> Result<Option<Record>, StoreError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE id = ?1",
            select_columns(kind),
            kind.table()
        );
        let conn = self.lock_conn()?;
        let record = conn
            .query_row(&sql, params![id], |row| row_to_record(kind, row))
            .optional()?;
        Ok(record)
    }

    fn page(
        &self,
        kind: RecordKind,
        after_id: Option<i64>,
        range: IdRange,
        limit: usize,
    ) -> Result<Vec<Record>, StoreError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE id > ?1 AND id <= ?2 ORDER BY id ASC LIMIT ?3",
            select_columns(kind),
            kind.table()
        );
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![range.lower_exclusive(after_id), range.upper_inclusive(), limit],
            |row| row_to_record(kind, row),
        )?;
        let records = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn save(&self, record: &mut Record) -> Result<(), StoreError> {
        let kind = record.kind();
        let fields = kind.encrypted_fields();
        let assignments: Vec<String> = fields
            .iter()
            .enumerate()
            .map(|(i, f)| format!("{f} = ?{}, {f}_encrypted = ?{}", 2 * i + 1, 2 * i + 2))
            .collect();
        let id_param = fields.len() * 2 + 1;
        let sql = format!(
            "UPDATE {} SET revision = revision + 1, {} WHERE id = ?{} AND revision = ?{}",
            kind.table(),
            assignments.join(", "),
            id_param,
            id_param + 1
        );

        let mut values = field_values(record)?;
        values.push(Value::Integer(record.id()));
        values.push(Value::Integer(record.revision()));

        let conn = self.lock_conn()?;
        let changed = conn.execute(&sql, params_from_iter(values.iter()))?;
        if changed == 1 {
            record.set_identity(record.id(), record.revision() + 1);
            return Ok(());
        }

        let exists: Option<i64> = conn
            .query_row(
                &format!("SELECT revision FROM {} WHERE id = ?1", kind.table()),
                params![record.id()],
                |row| row.get(0),
            )
            .optional()?;
        match exists {
            Some(_) => Err(StoreError::Conflict {
                kind,
                id: record.id(),
                expected: record.revision(),
            }),
            None => Err(StoreError::NotFound {
                kind,
                id: record.id(),
            }),
        }
    }

    fn count(&self, kind: RecordKind, range: IdRange) -> Result<u64, StoreError> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE id > ?1 AND id <= ?2",
            kind.table()
        );
        let conn = self.lock_conn()?;
        let n: i64 = conn.query_row(
            &sql,
            params![range.lower_exclusive(None), range.upper_inclusive()],
            |row| row.get(0),
        )?;
        Ok(u64::try_from(n).unwrap_or(0))
    }
}
