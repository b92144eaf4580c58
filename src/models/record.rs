//! Normalized trading rows and the read-side filter over them.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{AppError, Result};

/// Product codes must be longer than this to be treated as instrument rows.
pub const MIN_PRODUCT_CODE_LEN: usize = 3;

/// One instrument's trading result on one bulletin date.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradingRecord {
    pub exchange_product_id: String,
    pub exchange_product_name: String,
    /// First four characters of the product code
    pub oil_id: String,
    /// Characters 5 through 7 of the product code
    pub delivery_basis_id: String,
    pub delivery_basis_name: String,
    /// Last character of the product code
    pub delivery_type_id: String,
    /// Contract volume in units of measure, absent when the cell was blank
    pub volume: Option<Decimal>,
    /// Contract value in rubles, absent when the cell was blank
    pub total: Option<Decimal>,
    /// Number of contracts
    pub count: i64,
    pub date: NaiveDate,
    pub created_on: DateTime<Utc>,
    pub updated_on: DateTime<Utc>,
}

/// Identifier fields encoded in a product code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductCodeParts {
    pub oil_id: String,
    pub delivery_basis_id: String,
    pub delivery_type_id: String,
}

impl ProductCodeParts {
    /// Split a product code into its oil, delivery-basis and delivery-type ids.
    ///
    /// Slicing is by character, so short codes yield shorter ids rather than
    /// panicking.
    pub fn derive(code: &str) -> Self {
        let chars: Vec<char> = code.chars().collect();
        let slice = |from: usize, to: usize| -> String {
            let to = to.min(chars.len());
            let from = from.min(to);
            chars[from..to].iter().collect()
        };

        Self {
            oil_id: slice(0, 4),
            delivery_basis_id: slice(4, 7),
            delivery_type_id: chars.last().map(|c| c.to_string()).unwrap_or_default(),
        }
    }
}

/// Values pulled out of one bulletin row before stamping.
#[derive(Debug, Clone, PartialEq)]
pub struct RowValues {
    pub exchange_product_id: String,
    pub exchange_product_name: String,
    pub delivery_basis_name: String,
    pub volume: Option<Decimal>,
    pub total: Option<Decimal>,
    pub count: i64,
}

impl TradingRecord {
    /// Build a record for `date`, deriving the code-encoded identifiers.
    pub fn new(values: RowValues, date: NaiveDate, now: DateTime<Utc>) -> Self {
        let parts = ProductCodeParts::derive(&values.exchange_product_id);
        Self {
            exchange_product_id: values.exchange_product_id,
            exchange_product_name: values.exchange_product_name,
            oil_id: parts.oil_id,
            delivery_basis_id: parts.delivery_basis_id,
            delivery_basis_name: values.delivery_basis_name,
            delivery_type_id: parts.delivery_type_id,
            volume: values.volume,
            total: values.total,
            count: values.count,
            date,
            created_on: now,
            updated_on: now,
        }
    }
}

/// A persisted record with its surrogate key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredRecord {
    pub id: i64,
    #[serde(flatten)]
    pub record: TradingRecord,
}

/// Read-side query over stored records.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecordFilter {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub exchange_product_id: Option<String>,
    pub oil_id: Option<String>,
    pub delivery_basis_id: Option<String>,
    pub delivery_type_id: Option<String>,
    pub limit: usize,
}

impl Default for RecordFilter {
    fn default() -> Self {
        Self {
            start_date: None,
            end_date: None,
            exchange_product_id: None,
            oil_id: None,
            delivery_basis_id: None,
            delivery_type_id: None,
            limit: 100,
        }
    }
}

impl RecordFilter {
    /// Reject non-alphanumeric identifiers and empty result limits.
    pub fn validate(&self) -> Result<()> {
        if self.limit == 0 {
            return Err(AppError::validation("limit must be > 0"));
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start > end {
                return Err(AppError::validation("start_date is after end_date"));
            }
        }

        let identifiers = [
            ("exchange_product_id", &self.exchange_product_id),
            ("oil_id", &self.oil_id),
            ("delivery_basis_id", &self.delivery_basis_id),
            ("delivery_type_id", &self.delivery_type_id),
        ];
        for (name, value) in identifiers {
            if let Some(value) = value {
                if value.is_empty() || !value.chars().all(char::is_alphanumeric) {
                    return Err(AppError::validation(format!(
                        "{name} must contain only letters and digits"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Whether a record satisfies every set criterion.
    pub fn matches(&self, record: &TradingRecord) -> bool {
        fn eq(expected: &Option<String>, actual: &str) -> bool {
            expected.as_deref().is_none_or(|e| e == actual)
        }

        self.start_date.is_none_or(|d| record.date >= d)
            && self.end_date.is_none_or(|d| record.date <= d)
            && eq(&self.exchange_product_id, &record.exchange_product_id)
            && eq(&self.oil_id, &record.oil_id)
            && eq(&self.delivery_basis_id, &record.delivery_basis_id)
            && eq(&self.delivery_type_id, &record.delivery_type_id)
    }

    /// Stable digest of the filter parameters, used as a result-cache key.
    pub fn cache_key(&self) -> String {
        fn part<T: ToString>(value: &Option<T>) -> String {
            value.as_ref().map(ToString::to_string).unwrap_or_default()
        }

        let params = [
            part(&self.start_date),
            part(&self.end_date),
            part(&self.exchange_product_id),
            part(&self.oil_id),
            part(&self.delivery_basis_id),
            part(&self.delivery_type_id),
            self.limit.to_string(),
        ]
        .join(":");

        hex::encode(Sha256::digest(params.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(code: &str, date: NaiveDate) -> TradingRecord {
        TradingRecord::new(
            RowValues {
                exchange_product_id: code.to_string(),
                exchange_product_name: "Бензин (АИ-92-К5)".to_string(),
                delivery_basis_name: "ст. Новоселки".to_string(),
                volume: Some(Decimal::new(60, 0)),
                total: Some(Decimal::new(3_600_000, 0)),
                count: 1,
            },
            date,
            Utc::now(),
        )
    }

    #[test]
    fn test_derive_parts() {
        let parts = ProductCodeParts::derive("A001NSPO02");
        assert_eq!(parts.oil_id, "A001");
        assert_eq!(parts.delivery_basis_id, "NSP");
        assert_eq!(parts.delivery_type_id, "2");
    }

    #[test]
    fn test_derive_parts_short_code() {
        let parts = ProductCodeParts::derive("AB");
        assert_eq!(parts.oil_id, "AB");
        assert_eq!(parts.delivery_basis_id, "");
        assert_eq!(parts.delivery_type_id, "B");
    }

    #[test]
    fn test_new_record_derives_and_stamps() {
        let date = NaiveDate::from_ymd_opt(2023, 1, 15).unwrap();
        let rec = record("A592ACH060F", date);
        assert_eq!(rec.oil_id, "A592");
        assert_eq!(rec.delivery_basis_id, "ACH");
        assert_eq!(rec.delivery_type_id, "F");
        assert_eq!(rec.created_on, rec.updated_on);
        assert_eq!(rec.date, date);
    }

    #[test]
    fn test_filter_matches() {
        let date = NaiveDate::from_ymd_opt(2023, 1, 15).unwrap();
        let rec = record("A001NSPO02", date);

        let filter = RecordFilter {
            start_date: Some(date),
            end_date: Some(date),
            oil_id: Some("A001".to_string()),
            ..RecordFilter::default()
        };
        assert!(filter.matches(&rec));

        let other = RecordFilter {
            delivery_basis_id: Some("ACH".to_string()),
            ..RecordFilter::default()
        };
        assert!(!other.matches(&rec));

        let later = RecordFilter {
            start_date: date.succ_opt(),
            ..RecordFilter::default()
        };
        assert!(!later.matches(&rec));
    }

    #[test]
    fn test_filter_validate() {
        assert!(RecordFilter::default().validate().is_ok());

        let bad_id = RecordFilter {
            oil_id: Some("A0;1".to_string()),
            ..RecordFilter::default()
        };
        assert!(bad_id.validate().is_err());

        let zero = RecordFilter {
            limit: 0,
            ..RecordFilter::default()
        };
        assert!(zero.validate().is_err());
    }

    #[test]
    fn test_cache_key_stable_and_distinct() {
        let a = RecordFilter {
            oil_id: Some("A001".to_string()),
            ..RecordFilter::default()
        };
        let b = RecordFilter {
            delivery_type_id: Some("A001".to_string()),
            ..RecordFilter::default()
        };
        assert_eq!(a.cache_key(), a.clone().cache_key());
        assert_ne!(a.cache_key(), b.cache_key());
        assert_eq!(a.cache_key().len(), 64);
    }
}
