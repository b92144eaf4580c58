// src/pipeline/bulk.rs

//! Bulk loading over a date range.

use std::time::Instant;

use chrono::NaiveDate;

use crate::error::{AppError, Result};
use crate::models::RunReport;
use crate::pipeline::ingest::BulletinIngestor;
use crate::utils::dates::date_range;

/// Ingest every calendar date from `start` to `end` inclusive.
///
/// The locator's page cache is cleared first; listing pages shift as new
/// bulletins are published, so ranges cached by an earlier run are stale.
pub async fn run_bulk(
    ingestor: &BulletinIngestor,
    start: NaiveDate,
    end: NaiveDate,
    concurrency: usize,
) -> Result<RunReport> {
    if start > end {
        return Err(AppError::validation(format!(
            "start date {start} is after end date {end}"
        )));
    }

    let cache = ingestor.locator().cache();
    cache.clear();
    log::debug!("Page cache cleared");

    let dates = date_range(start, end);
    log::info!(
        "Loading {} dates from {start} to {end} with concurrency {concurrency}",
        dates.len()
    );

    let timer = Instant::now();
    let summary = ingestor.ingest_many(&dates, concurrency).await;
    let report = RunReport {
        start,
        end,
        summary,
        elapsed: timer.elapsed(),
    };

    log_report(&report);
    log::info!(
        "Page cache: {} pages cached {:?}",
        cache.len(),
        cache.pages()
    );

    Ok(report)
}

fn log_report(report: &RunReport) {
    let s = &report.summary;
    log::info!("Run {} .. {} finished", report.start, report.end);
    log::info!("  Dates processed: {}", s.processed);
    log::info!("  Ingested:        {}", s.ingested);
    log::info!("  Skipped:         {}", s.skipped);
    log::info!("  No data:         {}", s.no_data);
    log::info!("  Failed:          {}", s.failed);
    log::info!("  Records written: {}", s.records_written);
    log::info!("  Elapsed:         {:.2}s", report.elapsed.as_secs_f64());
    log::info!("  Throughput:      {:.2} dates/s", report.throughput());
}
