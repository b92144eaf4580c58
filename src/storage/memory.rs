//! In-process storage backend.
//!
//! Used for dry runs and tests. The whole check-then-insert for a date runs
//! under one lock acquisition, which gives it the same all-or-nothing
//! behavior as the database transaction.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;

use crate::error::Result;
use crate::models::{RecordFilter, StoredRecord, TradingRecord};
use crate::storage::{InsertOutcome, TradingStore};

#[derive(Debug, Default)]
struct Table {
    rows: Vec<StoredRecord>,
    next_id: i64,
}

/// Mutex-guarded in-memory table.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    table: Mutex<Table>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every stored row, in insertion order.
    pub fn snapshot(&self) -> Vec<StoredRecord> {
        self.table.lock().rows.clone()
    }

    pub fn len(&self) -> usize {
        self.table.lock().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.lock().rows.is_empty()
    }
}

#[async_trait]
impl TradingStore for MemoryStorage {
    async fn insert_for_date(
        &self,
        date: NaiveDate,
        records: &[TradingRecord],
    ) -> Result<InsertOutcome> {
        let mut table = self.table.lock();

        let existing = table.rows.iter().filter(|r| r.record.date == date).count() as u64;
        if existing > 0 {
            return Ok(InsertOutcome::AlreadyPresent(existing));
        }

        for record in records {
            table.next_id += 1;
            let id = table.next_id;
            table.rows.push(StoredRecord {
                id,
                record: record.clone(),
            });
        }
        Ok(InsertOutcome::Inserted(records.len()))
    }

    async fn count_for_date(&self, date: NaiveDate) -> Result<u64> {
        let table = self.table.lock();
        Ok(table.rows.iter().filter(|r| r.record.date == date).count() as u64)
    }

    async fn query(&self, filter: &RecordFilter) -> Result<Vec<StoredRecord>> {
        filter.validate()?;

        let table = self.table.lock();
        let mut rows: Vec<StoredRecord> = table
            .rows
            .iter()
            .filter(|r| filter.matches(&r.record))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.record.date.cmp(&a.record.date).then(b.id.cmp(&a.id)));
        rows.truncate(filter.limit);
        Ok(rows)
    }

    async fn latest_dates(&self, limit: usize) -> Result<Vec<NaiveDate>> {
        let table = self.table.lock();
        let dates: BTreeSet<NaiveDate> = table.rows.iter().map(|r| r.record.date).collect();
        Ok(dates.into_iter().rev().take(limit).collect())
    }
}
