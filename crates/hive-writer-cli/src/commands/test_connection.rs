//! Test connection command implementation.

use anyhow::Result;
use hive_writer_core::Runner;

/// Connect, run `SELECT 1` and print `{"status":"success"}`.
pub fn run(runner: &Runner) -> Result<()> {
    let response = runner.test_connection()?;
    println!("{}", serde_json::to_string(&response)?);
    Ok(())
}
