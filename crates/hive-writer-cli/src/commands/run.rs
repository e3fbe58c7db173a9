//! Run command implementation.

use anyhow::Result;
use hive_writer_core::Runner;
use tracing::info;

/// Load all exported tables.
pub fn run(runner: &Runner) -> Result<()> {
    let tables = runner.config().parameters.table_specs();
    info!(tables = tables.len(), "Starting Hive writer");

    let summary = runner.run()?;

    for load in &summary.loaded {
        info!(
            table = %load.table,
            rows = load.rows,
            incremental = load.incremental,
            "Table loaded"
        );
    }
    info!(
        loaded = summary.loaded.len(),
        skipped = summary.skipped.len(),
        "Writer finished"
    );
    Ok(())
}
