// src/services/columns.rs

//! Mapping of bulletin display columns to canonical fields.
//!
//! Bulletin headers drift between issues (line breaks, spacing, word order),
//! so a column matches a field when its normalized, lowercased name contains
//! every keyword listed for that field.

use std::collections::HashMap;

/// Canonical fields read from the metric-ton section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    ExchangeProductId,
    ExchangeProductName,
    DeliveryBasisName,
    Volume,
    Total,
    Count,
}

impl Field {
    pub fn name(self) -> &'static str {
        match self {
            Field::ExchangeProductId => "exchange_product_id",
            Field::ExchangeProductName => "exchange_product_name",
            Field::DeliveryBasisName => "delivery_basis_name",
            Field::Volume => "volume",
            Field::Total => "total",
            Field::Count => "count",
        }
    }
}

/// Required lowercase keywords per field.
///
/// The "total" header is printed as "Обьем" (soft sign) in the bulletins,
/// which also keeps it from colliding with the volume column.
pub const COLUMN_PATTERNS: &[(Field, &[&str])] = &[
    (Field::ExchangeProductId, &["код", "инструмента"]),
    (Field::ExchangeProductName, &["наименование", "инструмента"]),
    (Field::DeliveryBasisName, &["базис", "поставки"]),
    (Field::Volume, &["объем", "договоров", "единицах"]),
    (Field::Total, &["обьем", "договоров", "руб"]),
    (Field::Count, &["количество", "договоров", "шт"]),
];

/// Numeric fields coerced before filtering.
pub const NUMERIC_FIELDS: &[Field] = &[Field::Volume, Field::Total, Field::Count];

/// Collapse embedded line breaks and trim a header cell.
pub fn normalize_header(name: &str) -> String {
    name.replace(['\r', '\n'], " ").trim().to_string()
}

/// Match canonical fields to column indexes.
///
/// The first column satisfying a field's keywords wins. Fields without a
/// matching column are absent from the result.
pub fn match_columns<S: AsRef<str>>(columns: &[S]) -> HashMap<Field, usize> {
    let lowered: Vec<String> = columns
        .iter()
        .map(|c| normalize_header(c.as_ref()).to_lowercase())
        .collect();

    COLUMN_PATTERNS
        .iter()
        .filter_map(|(field, keywords)| {
            lowered
                .iter()
                .position(|name| keywords.iter().all(|k| name.contains(k)))
                .map(|idx| (*field, idx))
        })
        .collect()
}
