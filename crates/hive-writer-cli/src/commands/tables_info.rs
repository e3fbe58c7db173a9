//! Tables info command implementation.

use anyhow::Result;
use hive_writer_core::Runner;

/// Print the columns of every table in the configured database as JSON.
pub fn run(runner: &Runner) -> Result<()> {
    let response = runner.tables_info()?;
    println!("{}", serde_json::to_string(&response)?);
    Ok(())
}
