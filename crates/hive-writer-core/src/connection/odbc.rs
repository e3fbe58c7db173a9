//! `odbc-api` backed connection.

use super::{ColumnInfo, HiveConnection, Row};
use crate::error::DriverError;
use odbc_api::buffers::TextRowSet;
use odbc_api::{Connection, ConnectionOptions, Cursor, Environment};
use std::sync::OnceLock;
use tracing::{debug, trace};

/// Rows fetched per round trip.
const FETCH_BATCH_SIZE: usize = 500;

/// Upper bound for text column buffers; Hive reports huge sizes for STRING.
const MAX_TEXT_LENGTH: usize = 4096;

// SQLColumns result set positions
const COLUMNS_TABLE_NAME: usize = 2;
const COLUMNS_COLUMN_NAME: usize = 3;
const COLUMNS_TYPE_NAME: usize = 5;
const COLUMNS_COLUMN_SIZE: usize = 6;
const COLUMNS_NULLABLE: usize = 10;
const COLUMNS_COLUMN_DEF: usize = 12;

// SQLTables result set positions
const TABLES_TABLE_NAME: usize = 2;

/// Process-wide ODBC environment.
fn environment() -> Result<&'static Environment, DriverError> {
    static ENVIRONMENT: OnceLock<Environment> = OnceLock::new();

    if let Some(environment) = ENVIRONMENT.get() {
        return Ok(environment);
    }
    let environment = Environment::new()?;
    Ok(ENVIRONMENT.get_or_init(|| environment))
}

/// Live ODBC connection to HiveServer2.
pub struct OdbcConnection {
    connection: Connection<'static>,
    schema: String,
    /// Catalog reported by the driver, passed to reflection calls
    catalog: String,
}

impl OdbcConnection {
    /// Connect with a full connection string (including credentials).
    pub fn connect(connection_string: &str, schema: &str) -> Result<Self, DriverError> {
        let connection = environment()?
            .connect_with_connection_string(connection_string, ConnectionOptions::default())?;

        // Drivers that expose a catalog return no rows for reflection made
        // under a different one
        let catalog = match connection.current_catalog() {
            Ok(catalog) => catalog,
            Err(e) => {
                debug!(error = %e, "Driver reports no current catalog");
                String::new()
            }
        };
        debug!(catalog = %catalog, schema = %schema, "ODBC connection opened");

        Ok(Self {
            connection,
            schema: schema.to_string(),
            catalog,
        })
    }

    /// Schema the connection was opened with.
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Catalog used for column and table reflection.
    pub fn catalog(&self) -> &str {
        &self.catalog
    }
}

impl HiveConnection for OdbcConnection {
    fn execute(&self, sql: &str) -> Result<(), DriverError> {
        trace!(sql = %sql, "Executing statement");
        self.connection.execute(sql, ())?;
        Ok(())
    }

    fn query(&self, sql: &str) -> Result<Vec<Row>, DriverError> {
        trace!(sql = %sql, "Executing query");
        match self.connection.execute(sql, ())? {
            Some(cursor) => collect_rows(cursor),
            None => Ok(Vec::new()),
        }
    }

    fn columns(&self, table: &str) -> Result<Vec<ColumnInfo>, DriverError> {
        let cursor = self.connection.columns(&self.catalog, &self.schema, table, "%")?;
        let rows = collect_rows(cursor)?;

        // Table names are search patterns (`_` matches any character)
        Ok(rows
            .into_iter()
            .filter(|row| text(row, COLUMNS_TABLE_NAME).eq_ignore_ascii_case(table))
            .map(|row| ColumnInfo {
                name: text(&row, COLUMNS_COLUMN_NAME).to_string(),
                data_type: text(&row, COLUMNS_TYPE_NAME).to_string(),
                size: value(&row, COLUMNS_COLUMN_SIZE),
                nullable: text(&row, COLUMNS_NULLABLE) != "0",
                default: value(&row, COLUMNS_COLUMN_DEF),
            })
            .collect())
    }

    fn tables(&self, schema: &str) -> Result<Vec<String>, DriverError> {
        let cursor = self.connection.tables(&self.catalog, schema, "%", "")?;
        let rows = collect_rows(cursor)?;

        Ok(rows
            .iter()
            .map(|row| text(row, TABLES_TABLE_NAME).to_string())
            .filter(|name| !name.is_empty())
            .collect())
    }
}

/// Drain a cursor into text rows.
fn collect_rows(mut cursor: impl Cursor) -> Result<Vec<Row>, DriverError> {
    let mut buffers = TextRowSet::for_cursor(FETCH_BATCH_SIZE, &mut cursor, Some(MAX_TEXT_LENGTH))?;
    let mut row_set_cursor = cursor.bind_buffer(&mut buffers)?;

    let mut rows = Vec::new();
    while let Some(batch) = row_set_cursor.fetch()? {
        for row_index in 0..batch.num_rows() {
            let row = (0..batch.num_cols())
                .map(|col_index| {
                    batch
                        .at(col_index, row_index)
                        .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
                })
                .collect();
            rows.push(row);
        }
    }

    Ok(rows)
}

fn value(row: &Row, index: usize) -> Option<String> {
    row.get(index).cloned().flatten()
}

fn text(row: &Row, index: usize) -> &str {
    row.get(index)
        .and_then(|cell| cell.as_deref())
        .unwrap_or_default()
}
