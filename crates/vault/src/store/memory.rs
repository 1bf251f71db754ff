//! In-memory [`RecordStore`], mainly for tests and embedding.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use super::{IdRange, RecordStore, StoreError};
use crate::record::{Record, RecordKind};

#[derive(Debug, Default)]
struct Tables {
    rows: HashMap<RecordKind, BTreeMap<i64, Record>>,
    next_id: HashMap<RecordKind, i64>,
}

/// Thread-safe in-memory store with the same revision semantics as
/// [`SqliteStore`](super::SqliteStore).
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Backend("memory store poisoned".to_string()))
    }
}

impl RecordStore for MemoryStore {
    fn insert(&self, record: &Record) -> Result<Record, StoreError> {
        let mut tables = self.lock()?;
        let next = tables.next_id.entry(record.kind()).or_insert(1);
        let id = *next;
        *next += 1;

        let mut stored = record.clone();
        stored.set_identity(id, 0);
        tables
            .rows
            .entry(record.kind())
            .or_default()
            .insert(id, stored.clone());
        Ok(stored)
    }

    fn get(&self, kind: RecordKind, id: i64) -> Result<Option<Record>, StoreError> {
        let tables = self.lock()?;
        Ok(tables.rows.get(&kind).and_then(|t| t.get(&id)).cloned())
    }

    fn page(
        &self,
        kind: RecordKind,
        after_id: Option<i64>,
        range: IdRange,
        limit: usize,
    ) -> Result<Vec<Record>, StoreError> {
        let tables = self.lock()?;
        let Some(table) = tables.rows.get(&kind) else {
            return Ok(Vec::new());
        };
        let lower = range.lower_exclusive(after_id);
        let upper = range.upper_inclusive();
        if lower >= upper {
            return Ok(Vec::new());
        }
        Ok(table
            .range(lower + 1..=upper)
            .take(limit)
            .map(|(_, r)| r.clone())
            .collect())
    }

    fn save(&self, record: &mut Record) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        let (kind, id) = (record.kind(), record.id());
        let stored = tables
            .rows
            .get_mut(&kind)
            .and_then(|t| t.get_mut(&id))
            .ok_or(StoreError::NotFound { kind, id })?;
        if stored.revision() != record.revision() {
            return Err(StoreError::Conflict {
                kind,
                id,
                expected: record.revision(),
            });
        }
        record.set_identity(id, record.revision() + 1);
        *stored = record.clone();
        Ok(())
    }

    fn count(&self, kind: RecordKind, range: IdRange) -> Result<u64, StoreError> {
        let tables = self.lock()?;
        Ok(tables
            .rows
            .get(&kind)
            .map_or(0, |t| t.keys().filter(|id| range.contains(**id)).count() as u64))
    }
}
