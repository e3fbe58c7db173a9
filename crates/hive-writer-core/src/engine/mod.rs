//! Action orchestration.
//!
//! The [`Runner`] executes one configured action against Hive: loading the
//! exported tables, testing the connection, or reporting destination tables.

mod runner;

pub use runner::{RunSummary, Runner, StatusResponse, TableColumns, TableLoad, TablesInfoResponse};
