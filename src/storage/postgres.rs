//! PostgreSQL storage backend.
//!
//! ## Table Layout
//!
//! ```text
//! spimex_trading_results
//! ├── id                     BIGSERIAL PRIMARY KEY
//! ├── exchange_product_id    TEXT
//! ├── exchange_product_name  TEXT
//! ├── oil_id                 VARCHAR(4)
//! ├── delivery_basis_id      VARCHAR(3)
//! ├── delivery_basis_name    TEXT
//! ├── delivery_type_id       VARCHAR(1)
//! ├── volume                 NUMERIC   (nullable)
//! ├── total                  NUMERIC   (nullable)
//! ├── contract_count         BIGINT
//! ├── date                   DATE      (indexed, non-unique)
//! ├── created_on             TIMESTAMPTZ
//! └── updated_on             TIMESTAMPTZ
//! ```

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, QueryBuilder, Row};

use crate::error::Result;
use crate::models::{DatabaseConfig, RecordFilter, StoredRecord, TradingRecord};
use crate::storage::{InsertOutcome, TradingStore};

const TABLE: &str = "spimex_trading_results";

/// Rows per INSERT statement; twelve binds each stays under the 65535 bind limit.
const INSERT_CHUNK: usize = 1000;

const SELECT_COLUMNS: &str = "id, exchange_product_id, exchange_product_name, oil_id, \
     delivery_basis_id, delivery_basis_name, delivery_type_id, volume, total, \
     contract_count, date, created_on, updated_on";

/// Pooled PostgreSQL store.
#[derive(Clone)]
pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    /// Connect a pool and make sure the table exists.
    pub async fn connect(url: &str, config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(url)
            .await?;

        let storage = Self::from_pool(pool);
        storage.init_schema().await?;
        Ok(storage)
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the records table and its date index if missing.
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {TABLE} (
                id BIGSERIAL PRIMARY KEY,
                exchange_product_id TEXT NOT NULL,
                exchange_product_name TEXT NOT NULL,
                oil_id VARCHAR(4) NOT NULL,
                delivery_basis_id VARCHAR(3) NOT NULL,
                delivery_basis_name TEXT NOT NULL,
                delivery_type_id VARCHAR(1) NOT NULL,
                volume NUMERIC,
                total NUMERIC,
                contract_count BIGINT NOT NULL,
                date DATE NOT NULL,
                created_on TIMESTAMPTZ NOT NULL,
                updated_on TIMESTAMPTZ NOT NULL
            )
            "#
        ))
        .execute(&self.pool)
        .await?;

        // Tables created before blank amounts were kept as NULL
        sqlx::query(&format!(
            "ALTER TABLE {TABLE} ALTER COLUMN volume DROP NOT NULL, \
             ALTER COLUMN total DROP NOT NULL"
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{TABLE}_date ON {TABLE} (date)"
        ))
        .execute(&self.pool)
        .await?;

        log::info!("Table {TABLE} ready");
        Ok(())
    }

    /// One multi-row INSERT covering every record in `chunk`.
    fn insert_statement(chunk: &[TradingRecord]) -> QueryBuilder<'static, Postgres> {
        let mut builder = QueryBuilder::new(format!(
            "INSERT INTO {TABLE} (\
             exchange_product_id, exchange_product_name, oil_id, \
             delivery_basis_id, delivery_basis_name, delivery_type_id, \
             volume, total, contract_count, date, created_on, updated_on) "
        ));
        builder.push_values(chunk, |mut row, record| {
            row.push_bind(record.exchange_product_id.clone())
                .push_bind(record.exchange_product_name.clone())
                .push_bind(record.oil_id.clone())
                .push_bind(record.delivery_basis_id.clone())
                .push_bind(record.delivery_basis_name.clone())
                .push_bind(record.delivery_type_id.clone())
                .push_bind(record.volume)
                .push_bind(record.total)
                .push_bind(record.count)
                .push_bind(record.date)
                .push_bind(record.created_on)
                .push_bind(record.updated_on);
        });
        builder
    }

    fn stored_record(row: &PgRow) -> Result<StoredRecord> {
        Ok(StoredRecord {
            id: row.try_get("id")?,
            record: TradingRecord {
                exchange_product_id: row.try_get("exchange_product_id")?,
                exchange_product_name: row.try_get("exchange_product_name")?,
                oil_id: row.try_get("oil_id")?,
                delivery_basis_id: row.try_get("delivery_basis_id")?,
                delivery_basis_name: row.try_get("delivery_basis_name")?,
                delivery_type_id: row.try_get("delivery_type_id")?,
                volume: row.try_get("volume")?,
                total: row.try_get("total")?,
                count: row.try_get("contract_count")?,
                date: row.try_get("date")?,
                created_on: row.try_get("created_on")?,
                updated_on: row.try_get("updated_on")?,
            },
        })
    }
}

#[async_trait]
impl TradingStore for PgStorage {
    async fn insert_for_date(
        &self,
        date: NaiveDate,
        records: &[TradingRecord],
    ) -> Result<InsertOutcome> {
        // Dropping the transaction on any early return rolls it back.
        let mut tx = self.pool.begin().await?;

        let existing: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM {TABLE} WHERE date = $1"
        ))
        .bind(date)
        .fetch_one(&mut *tx)
        .await?;

        if existing > 0 {
            tx.rollback().await?;
            return Ok(InsertOutcome::AlreadyPresent(existing as u64));
        }

        for chunk in records.chunks(INSERT_CHUNK) {
            Self::insert_statement(chunk).build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(InsertOutcome::Inserted(records.len()))
    }

    async fn count_for_date(&self, date: NaiveDate) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM {TABLE} WHERE date = $1"
        ))
        .bind(date)
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u64)
    }

    async fn query(&self, filter: &RecordFilter) -> Result<Vec<StoredRecord>> {
        filter.validate()?;

        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {SELECT_COLUMNS} FROM {TABLE} WHERE TRUE"));

        if let Some(start) = filter.start_date {
            builder.push(" AND date >= ").push_bind(start);
        }
        if let Some(end) = filter.end_date {
            builder.push(" AND date <= ").push_bind(end);
        }

        let identifiers = [
            ("exchange_product_id", &filter.exchange_product_id),
            ("oil_id", &filter.oil_id),
            ("delivery_basis_id", &filter.delivery_basis_id),
            ("delivery_type_id", &filter.delivery_type_id),
        ];
        for (column, value) in identifiers {
            if let Some(value) = value {
                builder
                    .push(format!(" AND {column} = "))
                    .push_bind(value.clone());
            }
        }

        builder
            .push(" ORDER BY date DESC, id DESC LIMIT ")
            .push_bind(filter.limit as i64);

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(Self::stored_record).collect()
    }

    async fn latest_dates(&self, limit: usize) -> Result<Vec<NaiveDate>> {
        let dates: Vec<NaiveDate> = sqlx::query_scalar(&format!(
            "SELECT DISTINCT date FROM {TABLE} ORDER BY date DESC LIMIT $1"
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(dates)
    }
}
