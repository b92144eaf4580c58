//! Service layer for the bulletin loader.
//!
//! This module contains the business logic for:
//! - Listing page range caching (`PageCache`)
//! - Listing and file retrieval (`ListingSource`, `HttpListingSource`)
//! - Date to bulletin resolution (`PaginationLocator`)
//! - Metric-ton section parsing (`BulletinExtractor`)

pub mod columns;
pub mod extractor;
pub mod locator;
pub mod page_cache;
pub mod source;

pub use columns::{COLUMN_PATTERNS, Field, match_columns};
pub use extractor::{BulletinExtractor, Cell};
pub use locator::{BulletinFile, Located, PaginationLocator};
pub use page_cache::PageCache;
pub use source::{GatePermit, HttpListingSource, ListingSource, RequestGate};
