//! Listing page metadata and exchange date formats.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Canonical date format used on the command line and in storage.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Date format embedded in bulletin file names.
pub const EXCHANGE_DATE_FORMAT: &str = "%Y%m%d";

/// Date range of the bulletin links found on one listing page.
///
/// `first_date` and `last_date` are the dates of the first and last links in
/// page order. Pages list the most recent bulletin first, so `first_date` is
/// the newest date on the page and `last_date` the oldest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageListingEntry {
    pub page_number: u32,
    pub first_date: String,
    pub last_date: String,
}

impl PageListingEntry {
    /// Build an entry from the link dates of a page, in page order.
    ///
    /// Returns `None` when the page carried no bulletin links.
    pub fn from_dates(page_number: u32, dates: &[String]) -> Option<Self> {
        Some(Self {
            page_number,
            first_date: dates.first()?.clone(),
            last_date: dates.last()?.clone(),
        })
    }
}

/// Format a date the way bulletin file names carry it.
pub fn to_exchange_date(date: NaiveDate) -> String {
    date.format(EXCHANGE_DATE_FORMAT).to_string()
}

/// Parse a canonical `YYYY-MM-DD` date.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).ok()
}
