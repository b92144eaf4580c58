//! Storage abstractions for trading record persistence.
//!
//! Rows live in a single table keyed by a surrogate id with a non-unique
//! index on the bulletin date. A date is written at most once: the
//! existence check and the insert run in one transaction, so a date is either
//! fully absent or fully present.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::Result;
use crate::models::{RecordFilter, StoredRecord, TradingRecord};

// Re-export for convenience
pub use memory::MemoryStorage;
pub use postgres::PgStorage;

/// Result of writing one date's records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// All records were inserted
    Inserted(usize),
    /// Rows for the date already existed; nothing was written
    AlreadyPresent(u64),
}

/// Trait for trading record storage backends.
#[async_trait]
pub trait TradingStore: Send + Sync {
    /// Insert the records for `date` unless the date is already present.
    ///
    /// The check and the insert are one transaction; on error nothing for
    /// the date is persisted.
    async fn insert_for_date(
        &self,
        date: NaiveDate,
        records: &[TradingRecord],
    ) -> Result<InsertOutcome>;

    /// Number of rows stored for `date`.
    async fn count_for_date(&self, date: NaiveDate) -> Result<u64>;

    /// Rows matching `filter`, newest date first, then newest id first.
    async fn query(&self, filter: &RecordFilter) -> Result<Vec<StoredRecord>>;

    /// Distinct stored dates, most recent first.
    async fn latest_dates(&self, limit: usize) -> Result<Vec<NaiveDate>>;
}
