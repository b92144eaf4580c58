//! Per-date ingestion outcomes and run statistics.

use std::fmt;
use std::time::Duration;

use chrono::NaiveDate;

/// Result of one locate, extract and persist cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Records were written for the date
    Ingested { records: usize },
    /// The date was already present; nothing written
    AlreadyIngested { existing: u64 },
    /// No bulletin is published for the date, or it carried no trading rows
    NoData,
    /// No bulletin was found and the listing could not be read completely
    NotLocated,
    /// The bulletin could not be parsed
    ExtractionFailed { reason: String },
    /// The transaction failed and was rolled back
    PersistenceFailed { reason: String },
}

impl IngestOutcome {
    /// Records written by this outcome.
    pub fn records_written(&self) -> usize {
        match self {
            Self::Ingested { records } => *records,
            _ => 0,
        }
    }
}

impl fmt::Display for IngestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ingested { records } => write!(f, "ingested {records} records"),
            Self::AlreadyIngested { existing } => {
                write!(f, "already ingested ({existing} records)")
            }
            Self::NoData => write!(f, "no data"),
            Self::NotLocated => write!(f, "bulletin not found"),
            Self::ExtractionFailed { reason } => write!(f, "extraction failed: {reason}"),
            Self::PersistenceFailed { reason } => write!(f, "persistence failed: {reason}"),
        }
    }
}

/// Aggregate of many per-date outcomes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub processed: usize,
    pub ingested: usize,
    pub skipped: usize,
    /// Empty bulletins and unreadable ones
    pub no_data: usize,
    /// Dates not located or not persisted
    pub failed: usize,
    pub records_written: usize,
}

impl IngestSummary {
    /// Fold one outcome into the totals.
    pub fn record(&mut self, outcome: &IngestOutcome) {
        self.processed += 1;
        self.records_written += outcome.records_written();
        match outcome {
            IngestOutcome::Ingested { .. } => self.ingested += 1,
            IngestOutcome::AlreadyIngested { .. } => self.skipped += 1,
            IngestOutcome::NoData | IngestOutcome::ExtractionFailed { .. } => self.no_data += 1,
            IngestOutcome::NotLocated | IngestOutcome::PersistenceFailed { .. } => {
                self.failed += 1
            }
        }
    }
}

/// Statistics of a bulk run over a date range.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub summary: IngestSummary,
    pub elapsed: Duration,
}

impl RunReport {
    /// Dates processed per second of wall time.
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.summary.processed as f64 / secs
        } else {
            0.0
        }
    }
}
