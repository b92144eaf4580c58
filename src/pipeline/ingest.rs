// src/pipeline/ingest.rs

//! Per-date ingestion: locate, extract, persist.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::NaiveDate;
use futures::stream::{self, StreamExt};

use crate::models::{IngestOutcome, IngestSummary};
use crate::services::{BulletinExtractor, Located, PaginationLocator};
use crate::storage::{InsertOutcome, TradingStore};

/// Drives the locate, extract and persist steps for one or many dates.
pub struct BulletinIngestor {
    locator: PaginationLocator,
    extractor: BulletinExtractor,
    store: Arc<dyn TradingStore>,
}

impl BulletinIngestor {
    pub fn new(
        locator: PaginationLocator,
        extractor: BulletinExtractor,
        store: Arc<dyn TradingStore>,
    ) -> Self {
        Self {
            locator,
            extractor,
            store,
        }
    }

    pub fn locator(&self) -> &PaginationLocator {
        &self.locator
    }

    /// Ingest the bulletin for a single date.
    ///
    /// Every failure is reported through the outcome; steps after the
    /// first failing one are skipped for this date.
    pub async fn ingest(&self, date: NaiveDate) -> IngestOutcome {
        let file = match self.locator.locate(date).await {
            Located::Found(file) => file,
            Located::Unlisted => {
                log::info!("{date}: no bulletin published");
                return IngestOutcome::NoData;
            }
            Located::Unknown => {
                log::warn!("{date}: bulletin not found in listing");
                return IngestOutcome::NotLocated;
            }
        };
        log::debug!("{date}: downloaded {} ({} bytes)", file.url, file.bytes.len());

        let records = match self.extractor.try_extract(&file.bytes, date) {
            Ok(records) => records,
            Err(e) => {
                log::warn!("{date}: could not extract {}: {e}", file.url);
                return IngestOutcome::ExtractionFailed {
                    reason: e.to_string(),
                };
            }
        };

        if records.is_empty() {
            log::info!("{date}: bulletin has no trading rows");
            return IngestOutcome::NoData;
        }

        match self.store.insert_for_date(date, &records).await {
            Ok(InsertOutcome::Inserted(count)) => {
                log::info!("{date}: stored {count} records");
                IngestOutcome::Ingested { records: count }
            }
            Ok(InsertOutcome::AlreadyPresent(existing)) => {
                log::info!("{date}: already ingested ({existing} records), skipping");
                IngestOutcome::AlreadyIngested { existing }
            }
            Err(e) => {
                log::error!("{date}: insert rolled back: {e}");
                IngestOutcome::PersistenceFailed {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Ingest many dates with at most `concurrency` pipelines in flight.
    ///
    /// Repeated dates are dropped so the same date never runs twice in one
    /// batch. A failing date never stops the others.
    pub async fn ingest_many(&self, dates: &[NaiveDate], concurrency: usize) -> IngestSummary {
        let mut seen = HashSet::new();
        let unique: Vec<NaiveDate> = dates.iter().copied().filter(|d| seen.insert(*d)).collect();

        let outcomes: Vec<IngestOutcome> = stream::iter(unique)
            .map(|date| self.ingest(date))
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await;

        let mut summary = IngestSummary::default();
        for outcome in &outcomes {
            summary.record(outcome);
        }
        summary
    }
}
