// src/models/mod.rs

//! Domain models for the bulletin loader.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod listing;
mod outcome;
mod record;

// Re-export all public types
pub use config::{Config, DatabaseConfig, HttpConfig, IngestConfig, PAGE_PLACEHOLDER, SourceConfig};
pub use listing::{
    DATE_FORMAT, EXCHANGE_DATE_FORMAT, PageListingEntry, parse_date, to_exchange_date,
};
pub use outcome::{IngestOutcome, IngestSummary, RunReport};
pub use record::{
    MIN_PRODUCT_CODE_LEN, ProductCodeParts, RecordFilter, RowValues, StoredRecord, TradingRecord,
};
