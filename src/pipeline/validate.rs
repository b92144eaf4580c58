// src/pipeline/validate.rs

use std::path::Path;

use crate::error::Result;
use crate::models::Config;

/// Load and validate the configuration file, logging the effective settings.
pub fn run_validate(path: &Path) -> Result<Config> {
    log::info!("Validating configuration at {}", path.display());

    let config = match Config::load(path).and_then(|c| c.validate().map(|_| c)) {
        Ok(config) => config,
        Err(e) => {
            log::error!("Config validation failed: {e}");
            return Err(e);
        }
    };

    log::info!("✓ Config OK");
    log::info!("  Listing: {}", config.source.base_url);
    log::info!("  Max pages: {}", config.source.max_pages);
    log::info!("  Timeout: {}s", config.http.timeout_secs);
    log::info!(
        "  HTTP connections: {} ({} per host)",
        config.http.max_connections, config.http.max_per_host
    );
    log::info!("  Max concurrent dates: {}", config.ingest.max_concurrent);
    log::info!(
        "  Database: {}",
        if config.database.url.is_some() {
            "configured"
        } else {
            "from DATABASE_URL"
        }
    );

    Ok(config)
}
