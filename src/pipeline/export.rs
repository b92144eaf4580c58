// src/pipeline/export.rs

//! Export of stored records as JSON.

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::models::{RecordFilter, StoredRecord};
use crate::storage::TradingStore;

/// Query `store` and write the matching rows as a pretty JSON array.
///
/// Returns the rows written. The file is replaced atomically.
pub async fn export_records(
    store: &dyn TradingStore,
    filter: &RecordFilter,
    output: &Path,
) -> Result<usize> {
    let rows = query_records(store, filter).await?;
    write_json(output, &rows).await?;
    log::info!("Wrote {} records to {}", rows.len(), output.display());
    Ok(rows.len())
}

/// Query `store`, logging the filter's cache key.
pub async fn query_records(
    store: &dyn TradingStore,
    filter: &RecordFilter,
) -> Result<Vec<StoredRecord>> {
    log::debug!("Querying records (filter key {})", filter.cache_key());
    store.query(filter).await
}

/// Write JSON to a temp file next to `path`, then rename over it.
async fn write_json(path: &Path, rows: &[StoredRecord]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let bytes = serde_json::to_vec_pretty(rows)?;
    let tmp: PathBuf = path.with_extension("tmp");
    tokio::fs::write(&tmp, &bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
