// src/services/extractor.rs

//! Bulletin document extractor.
//!
//! Reads the first sheet of a bulletin workbook, finds the metric-ton section
//! by its marker row, maps the header beneath it onto canonical fields and
//! turns the section rows into [`TradingRecord`]s.

use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::str::FromStr;

use calamine::{Data, Reader, open_workbook_auto_from_rs};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};

use crate::error::{AppError, Result};
use crate::models::{IngestConfig, MIN_PRODUCT_CODE_LEN, RowValues, TradingRecord};
use crate::services::columns::{
    COLUMN_PATTERNS, Field, NUMERIC_FIELDS, match_columns, normalize_header,
};

/// Placeholders printed in numeric cells with no value.
const MISSING_PLACEHOLDERS: &[&str] = &["-", "—", "–"];

/// Sentinel some exporters write for missing product codes.
const MISSING_SENTINEL: &str = "nan";

/// A spreadsheet cell reduced to what extraction needs.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
}

impl Cell {
    pub fn text(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(s) => s.clone(),
            Cell::Number(n) => n.to_string(),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    /// Numeric value, treating dash placeholders and junk as missing.
    pub fn decimal(&self) -> Option<Decimal> {
        match self {
            Cell::Empty => None,
            Cell::Number(n) if n.is_finite() => Decimal::from_f64(*n),
            Cell::Number(_) => None,
            Cell::Text(s) => {
                let s = s.trim();
                if s.is_empty() || MISSING_PLACEHOLDERS.contains(&s) {
                    return None;
                }
                Decimal::from_str(s).ok().or_else(|| {
                    s.parse::<f64>()
                        .ok()
                        .filter(|n| n.is_finite())
                        .and_then(Decimal::from_f64)
                })
            }
        }
    }
}

impl From<&Data> for Cell {
    fn from(value: &Data) -> Self {
        match value {
            Data::Empty | Data::Error(_) => Cell::Empty,
            Data::String(s) if s.trim().is_empty() => Cell::Empty,
            Data::String(s) => Cell::Text(s.clone()),
            Data::Float(f) => Cell::Number(*f),
            Data::Int(i) => Cell::Number(*i as f64),
            other => Cell::Text(other.to_string()),
        }
    }
}

/// Read the first sheet of a workbook (xls, xlsx, xlsb or ods) as a grid.
pub fn read_grid(bytes: &[u8]) -> Result<Vec<Vec<Cell>>> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| AppError::extraction("workbook has no sheets"))??;

    Ok(range
        .rows()
        .map(|row| row.iter().map(Cell::from).collect())
        .collect())
}

/// Concatenated text of the non-empty cells of a row.
fn row_text(row: &[Cell]) -> String {
    row.iter()
        .filter(|cell| !cell.is_empty())
        .map(Cell::text)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Extracts metric-ton trading rows from bulletin workbooks.
#[derive(Debug, Clone)]
pub struct BulletinExtractor {
    section_marker: String,
    section_end_prefix: String,
    total_marker: String,
}

impl BulletinExtractor {
    pub fn new(config: &IngestConfig) -> Self {
        Self {
            section_marker: config.section_marker.clone(),
            section_end_prefix: config.section_end_prefix.clone(),
            total_marker: config.total_marker.clone(),
        }
    }

    /// Extract records, logging and swallowing any failure as "no rows".
    pub fn extract(&self, bytes: &[u8], date: NaiveDate) -> Vec<TradingRecord> {
        self.try_extract(bytes, date).unwrap_or_else(|error| {
            log::warn!("Bulletin for {date} could not be extracted: {error}");
            Vec::new()
        })
    }

    /// Extract records from raw workbook bytes.
    pub fn try_extract(&self, bytes: &[u8], date: NaiveDate) -> Result<Vec<TradingRecord>> {
        let grid = read_grid(bytes)?;
        self.extract_grid(&grid, date, Utc::now())
    }

    /// Extract records from an already-read grid, stamping them with `now`.
    pub fn extract_grid(
        &self,
        grid: &[Vec<Cell>],
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Vec<TradingRecord>> {
        let marker_idx = grid
            .iter()
            .position(|row| row_text(row).contains(&self.section_marker))
            .ok_or_else(|| {
                AppError::extraction(format!("section marker '{}' not found", self.section_marker))
            })?;

        let header = grid
            .get(marker_idx + 1)
            .ok_or_else(|| AppError::extraction("section header row is missing"))?;
        let names: Vec<String> = header.iter().map(|c| normalize_header(&c.text())).collect();
        let columns = resolve_columns(&names)?;

        let mut seen = HashSet::new();
        let mut records = Vec::new();

        for row in &grid[marker_idx + 2..] {
            if self.ends_section(row) {
                break;
            }
            let Some(values) = self.row_values(row, &columns) else {
                continue;
            };
            if !seen.insert(values.exchange_product_id.clone()) {
                return Err(AppError::extraction(format!(
                    "duplicate product code {} in section",
                    values.exchange_product_id
                )));
            }
            records.push(TradingRecord::new(values, date, now));
        }

        Ok(records)
    }

    fn ends_section(&self, row: &[Cell]) -> bool {
        !self.section_end_prefix.is_empty() && row_text(row).contains(&self.section_end_prefix)
    }

    /// Filter and coerce one section row; `None` drops the row.
    fn row_values(&self, row: &[Cell], columns: &HashMap<Field, usize>) -> Option<RowValues> {
        let cell = |field: Field| row.get(columns[&field]).unwrap_or(&Cell::Empty);

        let code = cell(Field::ExchangeProductId).text().trim().to_string();
        if code.chars().count() <= MIN_PRODUCT_CODE_LEN {
            return None;
        }

        let numbers: HashMap<Field, Option<Decimal>> = NUMERIC_FIELDS
            .iter()
            .map(|field| (*field, cell(*field).decimal()))
            .collect();
        if numbers.values().all(Option::is_none) {
            return None;
        }
        let (volume, total, count) = (
            numbers[&Field::Volume],
            numbers[&Field::Total],
            numbers[&Field::Count],
        );

        if code.contains(&self.total_marker) || code.eq_ignore_ascii_case(MISSING_SENTINEL) {
            return None;
        }

        let count = count.filter(|c| *c > Decimal::ZERO)?.trunc().to_i64()?;
        if count <= 0 {
            return None;
        }

        Some(RowValues {
            exchange_product_id: code,
            exchange_product_name: cell(Field::ExchangeProductName).text().trim().to_string(),
            delivery_basis_name: cell(Field::DeliveryBasisName).text().trim().to_string(),
            volume,
            total,
            count,
        })
    }
}

/// Map every canonical field to a header column or fail.
fn resolve_columns(names: &[String]) -> Result<HashMap<Field, usize>> {
    let columns = match_columns(names);
    if !columns.contains_key(&Field::ExchangeProductId) {
        return Err(AppError::extraction(format!(
            "no column matches {}",
            Field::ExchangeProductId.name()
        )));
    }
    for (field, _) in COLUMN_PATTERNS {
        if !columns.contains_key(field) {
            return Err(AppError::extraction(format!("no column matches {}", field.name())));
        }
    }
    Ok(columns)
}
