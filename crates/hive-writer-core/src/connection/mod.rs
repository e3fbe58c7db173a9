//! Database connection layer.
//!
//! [`HiveConnection`] is the seam between the write engine and the driver: it
//! executes statements, returns text rows, and exposes catalog reflection.
//! [`OdbcConnection`] implements it on top of `odbc-api`; tests use in-memory
//! implementations.

mod factory;
mod odbc;

pub use factory::{ConnectionFactory, HiveSession};
pub use odbc::OdbcConnection;

use crate::error::DriverError;
use serde::Serialize;

/// Result row as text; `None` is SQL NULL.
pub type Row = Vec<Option<String>>;

/// Operations the write engine needs from a live connection.
///
/// Connections are used from one thread, one statement at a time.
pub trait HiveConnection {
    /// Execute a statement, discarding any result set.
    fn execute(&self, sql: &str) -> Result<(), DriverError>;

    /// Execute a query and collect all rows as text.
    fn query(&self, sql: &str) -> Result<Vec<Row>, DriverError>;

    /// Reflect the columns of `table`, in table order.
    fn columns(&self, table: &str) -> Result<Vec<ColumnInfo>, DriverError>;

    /// List table names in `schema`.
    fn tables(&self, schema: &str) -> Result<Vec<String>, DriverError>;
}

impl<C: HiveConnection + ?Sized> HiveConnection for &C {
    fn execute(&self, sql: &str) -> Result<(), DriverError> {
        (**self).execute(sql)
    }

    fn query(&self, sql: &str) -> Result<Vec<Row>, DriverError> {
        (**self).query(sql)
    }

    fn columns(&self, table: &str) -> Result<Vec<ColumnInfo>, DriverError> {
        (**self).columns(table)
    }

    fn tables(&self, schema: &str) -> Result<Vec<String>, DriverError> {
        (**self).tables(schema)
    }
}

/// Reflected column metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    /// Column name
    #[serde(rename = "COLUMN_NAME")]
    pub name: String,
    /// Driver-reported type name (e.g. `STRING`, `INT`)
    #[serde(rename = "DATA_TYPE")]
    pub data_type: String,
    /// Column size, when reported
    #[serde(skip)]
    pub size: Option<String>,
    /// Whether NULL is allowed
    #[serde(skip)]
    pub nullable: bool,
    /// Default value, when reported
    #[serde(skip)]
    pub default: Option<String>,
}

impl ColumnInfo {
    /// Column with a name and type only.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            size: None,
            nullable: true,
            default: None,
        }
    }
}
