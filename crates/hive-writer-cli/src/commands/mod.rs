//! CLI command implementations.

pub mod run;
pub mod tables_info;
pub mod test_connection;
