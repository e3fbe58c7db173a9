//! Hive Writer Core - batch loading of CSV tables into Apache Hive
//!
//! This library provides the core functionality for writing tabular data into
//! Hive over ODBC:
//!
//! - Connection setup with TLS certificates and optional SSH tunnels
//! - Server capability detection (version, MERGE support)
//! - DDL generation for plain and transactional ORC tables
//! - Batched positional inserts and MERGE based upserts

pub mod capabilities;
pub mod certs;
pub mod config;
pub mod connection;
pub mod dsn;
pub mod engine;
pub mod error;
pub mod sql;
pub mod tunnel;
pub mod writer;

// Re-export commonly used types
pub use capabilities::ServerCapabilities;
pub use config::Config;
pub use connection::{ColumnInfo, ConnectionFactory, HiveConnection};
pub use engine::Runner;
pub use error::{CertificateError, DriverError, SchemaError};
pub use error::{Error, Result};
pub use writer::HiveWriter;
