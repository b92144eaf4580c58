//! Pipeline entry points for loader operations.
//!
//! - `BulletinIngestor`: locate, extract and persist one or many dates
//! - `run_bulk`: ingest a whole date range and report run statistics
//! - `export_records`: write stored rows matching a filter as JSON
//! - `run_validate`: check a configuration file

pub mod bulk;
pub mod export;
pub mod ingest;
pub mod validate;

pub use bulk::run_bulk;
pub use export::{export_records, query_records};
pub use ingest::BulletinIngestor;
pub use validate::run_validate;
