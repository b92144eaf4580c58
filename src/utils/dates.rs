//! Calendar date sequences.

use chrono::NaiveDate;

/// Every calendar day from `start` to `end`, both inclusive.
///
/// Empty when `start` is after `end`.
pub fn date_range(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start
        .iter_days()
        .take_while(|day| *day <= end)
        .collect()
}
