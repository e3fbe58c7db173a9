//! Runner for the writer actions.
//!
//! Each table is loaded in sequence:
//! - full load: drop the destination, create it, insert the CSV
//! - incremental load: insert the CSV into a temporary staging table, create
//!   or validate the destination, upsert from the stage, drop the stage

use crate::config::{Config, TableSpec};
use crate::connection::{ColumnInfo, ConnectionFactory, HiveConnection};
use crate::writer::{self, HiveWriter};
use crate::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const STATUS_SUCCESS: &str = "success";

/// `{"status": "success"}` answer of sync actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}

impl StatusResponse {
    pub fn success() -> Self {
        Self {
            status: STATUS_SUCCESS,
        }
    }
}

/// Columns of one destination table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableColumns {
    pub columns: Vec<ColumnInfo>,
}

/// Answer of the `getTablesInfo` action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TablesInfoResponse {
    pub status: &'static str,
    pub tables: BTreeMap<String, TableColumns>,
}

/// Result of loading one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableLoad {
    /// Destination table
    pub table: String,
    /// Rows read from the CSV
    pub rows: u64,
    /// Loaded through a staging table
    pub incremental: bool,
}

/// Result of the `run` action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Loaded tables, in configuration order
    pub loaded: Vec<TableLoad>,
    /// Tables with `export` disabled
    pub skipped: Vec<String>,
}

/// Executes writer actions for one configuration.
pub struct Runner {
    config: Config,
    data_dir: PathBuf,
    factory: ConnectionFactory,
}

impl Runner {
    /// Create a runner. `data_dir` holds the `in/tables` input directory.
    pub fn new(config: Config, data_dir: impl Into<PathBuf>, factory: ConnectionFactory) -> Self {
        Self {
            config,
            data_dir: data_dir.into(),
            factory,
        }
    }

    /// Configuration in use.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Input CSV for a table: `<data_dir>/in/tables/<tableId>.csv`.
    pub fn input_path(&self, table: &TableSpec) -> PathBuf {
        input_path(&self.data_dir, &table.table_id)
    }

    /// Load all exported tables.
    pub fn run(&self) -> Result<RunSummary> {
        let session = self.factory.create_connection(&self.config.parameters.db)?;
        let writer = HiveWriter::new(session.connection(), self.database());
        self.run_with(&writer)
    }

    /// Load all exported tables through an existing writer.
    pub fn run_with<C: HiveConnection>(&self, writer: &HiveWriter<C>) -> Result<RunSummary> {
        let mut summary = RunSummary::default();

        for table in self.config.parameters.table_specs() {
            if !table.export {
                info!(table = %table.db_name, "Table export disabled, skipping");
                summary.skipped.push(table.db_name.clone());
                continue;
            }

            let path = self.input_path(&table);
            info!(
                table = %table.db_name,
                source = %path.display(),
                incremental = table.incremental,
                "Loading table"
            );

            let rows = if table.incremental {
                self.load_incremental(writer, &table, &path)?
            } else {
                self.load_full(writer, &table, &path)?
            };

            summary.loaded.push(TableLoad {
                table: table.db_name.clone(),
                rows,
                incremental: table.incremental,
            });
        }

        info!(
            loaded = summary.loaded.len(),
            skipped = summary.skipped.len(),
            "Run finished"
        );
        Ok(summary)
    }

    fn load_full<C: HiveConnection>(
        &self,
        writer: &HiveWriter<C>,
        table: &TableSpec,
        path: &Path,
    ) -> Result<u64> {
        writer.drop(&table.db_name)?;
        writer.create(table)?;
        writer.write_file(path, table)
    }

    fn load_incremental<C: HiveConnection>(
        &self,
        writer: &HiveWriter<C>,
        table: &TableSpec,
        path: &Path,
    ) -> Result<u64> {
        let staging = table.staging(writer::generate_tmp_name(&table.db_name));
        writer.create(&staging)?;

        let result = self.merge_from_stage(writer, table, &staging, path);

        match writer.drop(&staging.db_name) {
            Ok(()) => result,
            Err(e) if result.is_ok() => Err(e),
            Err(e) => {
                warn!(table = %staging.db_name, error = %e, "Cannot drop staging table");
                result
            }
        }
    }

    fn merge_from_stage<C: HiveConnection>(
        &self,
        writer: &HiveWriter<C>,
        table: &TableSpec,
        staging: &TableSpec,
        path: &Path,
    ) -> Result<u64> {
        let rows = writer.write_file(path, staging)?;

        if writer.table_exists(&table.db_name) {
            writer.validate_table(table)?;
        } else {
            writer.create(table)?;
        }

        writer.upsert(staging, &table.db_name)?;
        Ok(rows)
    }

    /// Open a connection and run `SELECT 1`.
    pub fn test_connection(&self) -> Result<StatusResponse> {
        let session = self.factory.create_connection(&self.config.parameters.db)?;
        let writer = HiveWriter::with_capabilities(
            session.connection(),
            self.database(),
            Default::default(),
        );
        writer.test_connection()?;
        Ok(StatusResponse::success())
    }

    /// Report columns of every table in the configured database.
    pub fn tables_info(&self) -> Result<TablesInfoResponse> {
        let session = self.factory.create_connection(&self.config.parameters.db)?;
        let writer = HiveWriter::with_capabilities(
            session.connection(),
            self.database(),
            Default::default(),
        );
        self.tables_info_with(&writer)
    }

    /// Report columns of every table through an existing writer.
    pub fn tables_info_with<C: HiveConnection>(
        &self,
        writer: &HiveWriter<C>,
    ) -> Result<TablesInfoResponse> {
        let mut tables = BTreeMap::new();
        for name in writer.show_tables(self.database())? {
            let columns = writer.get_table_info(&name)?;
            tables.insert(name, TableColumns { columns });
        }

        Ok(TablesInfoResponse {
            status: STATUS_SUCCESS,
            tables,
        })
    }

    fn database(&self) -> &str {
        self.config
            .parameters
            .db
            .database
            .as_deref()
            .unwrap_or_default()
    }
}

fn input_path(data_dir: &Path, table_id: &str) -> PathBuf {
    data_dir
        .join("in")
        .join("tables")
        .join(format!("{}.csv", table_id))
}
