//! Hive write engine.
//!
//! Turns table configurations into HiveQL and runs it over a
//! [`HiveConnection`]:
//! - DDL: create and drop tables, bucketed transactional tables for upserts
//! - Bulk load: CSV rows as batched positional `INSERT ... VALUES`
//! - Upsert: `MERGE` by primary key, or `INSERT ... SELECT` without one
//! - Reflection: existence checks, schema validation and column listings

use crate::capabilities::ServerCapabilities;
use crate::config::{ColumnSpec, TableSpec};
use crate::connection::{ColumnInfo, HiveConnection};
use crate::error::{DriverError, SchemaError};
use crate::sql::{self, quote_identifier, quote_text};
use crate::{Error, Result};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

/// Column types accepted in table configurations.
pub const ALLOWED_TYPES: [&str; 15] = [
    "bigint",
    "boolean",
    "char",
    "decimal",
    "double",
    "float",
    "int",
    "real",
    "smallint",
    "string",
    "timestamp",
    "date",
    "tinyint",
    "varchar",
    "binary",
];

/// Types that take a size suffix.
pub const SIZED_TYPES: [&str; 3] = ["char", "decimal", "varchar"];

/// Upper bound for values in a single INSERT statement.
const MAX_VALUES_PER_STATEMENT: usize = 3000;

/// Allowed column types.
pub fn allowed_types() -> &'static [&'static str] {
    &ALLOWED_TYPES
}

/// Check a column's type against the allowed set.
pub fn check_column_type(column: &ColumnSpec) -> Result<()> {
    let type_name = column.type_name();
    if ALLOWED_TYPES.contains(&type_name.as_str()) {
        return Ok(());
    }

    Err(SchemaError::UnsupportedType {
        column: column.db_name.clone(),
        type_name: column.column_type.clone(),
        allowed: ALLOWED_TYPES.join(", "),
    }
    .into())
}

/// Rows per INSERT for a table with `columns` live columns.
pub fn batch_size(columns: usize) -> usize {
    (MAX_VALUES_PER_STATEMENT / columns.max(1))
        .saturating_sub(1)
        .max(1)
}

/// Unique staging table name derived from `table_name`.
pub fn generate_tmp_name(table_name: &str) -> String {
    format!("{}_temp_{}", table_name, uuid::Uuid::new_v4().simple())
}

/// `name type[(size)]` column definition.
fn column_definition(column: &ColumnSpec) -> String {
    let type_name = column.type_name();
    match column.size.as_deref().filter(|s| !s.is_empty()) {
        Some(size) if SIZED_TYPES.contains(&type_name.as_str()) => {
            format!("{} {}({})", quote_identifier(&column.db_name), type_name, size)
        }
        _ => format!("{} {}", quote_identifier(&column.db_name), type_name),
    }
}

/// Writes tables into Hive over a connection.
pub struct HiveWriter<C: HiveConnection> {
    /// Live connection
    connection: C,
    /// Database the connection is bound to
    database: String,
    /// What the server supports
    capabilities: ServerCapabilities,
}

impl<C: HiveConnection> HiveWriter<C> {
    /// Create a writer, detecting server capabilities.
    pub fn new(connection: C, database: impl Into<String>) -> Self {
        let capabilities = ServerCapabilities::detect(&connection);
        Self::with_capabilities(connection, database, capabilities)
    }

    /// Create a writer with known capabilities.
    pub fn with_capabilities(
        connection: C,
        database: impl Into<String>,
        capabilities: ServerCapabilities,
    ) -> Self {
        Self {
            connection,
            database: database.into(),
            capabilities,
        }
    }

    /// Server capabilities in effect.
    pub fn capabilities(&self) -> &ServerCapabilities {
        &self.capabilities
    }

    /// Underlying connection.
    pub fn connection(&self) -> &C {
        &self.connection
    }

    /// Create the table described by `table`.
    ///
    /// Incremental tables with a primary key are created bucketed and
    /// transactional so they can be MERGE targets.
    pub fn create(&self, table: &TableSpec) -> Result<()> {
        let sql = self.create_table_sql(table)?;
        info!(table = %table.db_name, temporary = table.temporary, "Creating table");
        self.connection.execute(&sql)?;
        Ok(())
    }

    fn create_table_sql(&self, table: &TableSpec) -> Result<String> {
        let columns: Vec<&ColumnSpec> = table.live_columns().collect();
        if columns.is_empty() {
            return Err(SchemaError::NoColumns(table.db_name.clone()).into());
        }
        for column in &columns {
            check_column_type(column)?;
        }

        let storage = if table.requires_merge() {
            if !self.capabilities.merge_supported {
                return Err(Error::Capability(format!(
                    "Table \"{}\" is incremental with a primary key, which requires MERGE support (Hive 2.2.0+). Detected server version: {}.",
                    table.db_name,
                    self.capabilities.version.as_deref().unwrap_or("unknown")
                )));
            }

            let keys: Vec<String> = table.primary_key.iter().map(|k| quote_identifier(k)).collect();
            format!(
                "CLUSTERED BY ({}) INTO 1 BUCKETS STORED AS ORC TBLPROPERTIES ('transactional'='true')",
                keys.join(", ")
            )
        } else {
            "STORED AS ORC".to_string()
        };

        let definitions: Vec<String> = columns.iter().map(|c| column_definition(c)).collect();
        let kind = if table.temporary {
            "CREATE TEMPORARY TABLE"
        } else {
            "CREATE TABLE"
        };

        Ok(format!(
            "{} {} ({}) {}",
            kind,
            quote_identifier(&table.db_name),
            definitions.join(", "),
            storage
        ))
    }

    /// Drop a table if it exists.
    pub fn drop(&self, table_name: &str) -> Result<()> {
        info!(table = %table_name, "Dropping table");
        self.connection
            .execute(&format!("DROP TABLE IF EXISTS {}", quote_identifier(table_name)))?;
        Ok(())
    }

    /// Load a CSV file into `table`.
    pub fn write_file(&self, path: &Path, table: &TableSpec) -> Result<u64> {
        let file = File::open(path).map_err(|e| {
            Error::Csv(format!("Cannot open input file {}: {}", path.display(), e))
        })?;
        self.write(file, table)
    }

    /// Load CSV data (header row first) into `table`.
    ///
    /// Values are inserted in table column order. Columns without a matching
    /// CSV header are filled with NULL. Returns the number of rows written.
    pub fn write<R: Read>(&self, input: R, table: &TableSpec) -> Result<u64> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(input);

        let header_index: HashMap<String, usize> = reader
            .headers()?
            .iter()
            .enumerate()
            .map(|(index, name)| (name.to_string(), index))
            .collect();

        let columns: Vec<(&ColumnSpec, Option<usize>)> = table
            .live_columns()
            .map(|column| (column, header_index.get(&column.name).copied()))
            .collect();
        if columns.is_empty() {
            return Err(SchemaError::NoColumns(table.db_name.clone()).into());
        }

        for (column, index) in &columns {
            if index.is_none() {
                warn!(
                    table = %table.db_name,
                    column = %column.name,
                    "Column not present in CSV, inserting NULL"
                );
            }
        }

        let batch_size = batch_size(columns.len());
        let insert = format!("INSERT INTO {} VALUES ", quote_identifier(&table.db_name));
        let mut tuples: Vec<String> = Vec::with_capacity(batch_size);
        let mut rows: u64 = 0;

        for record in reader.records() {
            let record = record?;
            let values: Vec<String> = columns
                .iter()
                .map(|(column, index)| {
                    self.render_value(column, index.and_then(|i| record.get(i)))
                })
                .collect();
            tuples.push(format!("({})", values.join(", ")));

            if tuples.len() >= batch_size {
                rows += self.flush(&insert, &mut tuples, &table.db_name)?;
            }
        }
        if !tuples.is_empty() {
            rows += self.flush(&insert, &mut tuples, &table.db_name)?;
        }

        info!(table = %table.db_name, rows = rows, "Table written");
        Ok(rows)
    }

    fn render_value(&self, column: &ColumnSpec, value: Option<&str>) -> String {
        match value {
            None => sql::NULL.to_string(),
            Some("") if column.nullable => sql::NULL.to_string(),
            Some(value) => quote_text(value, self.capabilities.legacy_escaping),
        }
    }

    fn flush(&self, insert: &str, tuples: &mut Vec<String>, table: &str) -> Result<u64> {
        let count = tuples.len() as u64;
        let statement = format!("{}{}", insert, tuples.join(", "));
        tuples.clear();

        debug!(table = %table, rows = count, "Inserting batch");
        self.connection.execute(&statement)?;
        Ok(count)
    }

    /// Move rows from the `source` table into `target_table`.
    ///
    /// With a primary key the rows are merged; key columns are never updated.
    /// Without one they are appended. Values follow the target's column order
    /// and target columns missing in `source` receive NULL.
    pub fn upsert(&self, source: &TableSpec, target_table: &str) -> Result<()> {
        let target_columns = self.connection.columns(target_table)?;
        if target_columns.is_empty() {
            return Err(DriverError::new(format!(
                "Destination table \"{}\" not found or has no columns",
                target_table
            ))
            .into());
        }

        let sql = if source.primary_key.is_empty() {
            insert_select_sql(source, target_table, &target_columns)
        } else {
            if !self.capabilities.merge_supported {
                return Err(Error::Capability(format!(
                    "Upsert into \"{}\" by primary key requires MERGE support (Hive 2.2.0+).",
                    target_table
                )));
            }
            merge_sql(source, target_table, &target_columns)
        };

        info!(
            source = %source.db_name,
            target = %target_table,
            merge = !source.primary_key.is_empty(),
            "Upserting table"
        );
        self.connection.execute(&sql)?;
        Ok(())
    }

    /// Whether a table exists in the connection's database.
    ///
    /// Uses catalog reflection; only when reflection itself fails does a
    /// failing `SELECT` count as absence.
    pub fn table_exists(&self, table_name: &str) -> bool {
        match self.connection.tables(&self.database) {
            Ok(tables) => tables.iter().any(|t| t.eq_ignore_ascii_case(table_name)),
            Err(e) => {
                debug!(table = %table_name, error = %e, "Table reflection failed, probing with SELECT");
                self.connection
                    .execute(&format!("SELECT 1 FROM {} LIMIT 1", quote_identifier(table_name)))
                    .is_ok()
            }
        }
    }

    /// Check that the destination table matches the configured columns.
    pub fn validate_table(&self, table: &TableSpec) -> Result<()> {
        let destination = self.connection.columns(&table.db_name)?;

        for column in table.live_columns() {
            let found = destination
                .iter()
                .find(|d| d.name.eq_ignore_ascii_case(&column.db_name))
                .ok_or_else(|| SchemaError::ColumnNotFound {
                    table: table.db_name.clone(),
                    column: column.db_name.clone(),
                })?;

            if !found.data_type.eq_ignore_ascii_case(&column.column_type) {
                return Err(SchemaError::TypeMismatch {
                    table: table.db_name.clone(),
                    column: column.db_name.clone(),
                    configured: column.column_type.clone(),
                    destination: found.data_type.clone(),
                }
                .into());
            }
        }

        debug!(table = %table.db_name, "Destination table matches configuration");
        Ok(())
    }

    /// Reflected columns of a table.
    pub fn get_table_info(&self, table_name: &str) -> Result<Vec<ColumnInfo>> {
        Ok(self.connection.columns(table_name)?)
    }

    /// Table names in a database.
    pub fn show_tables(&self, database: &str) -> Result<Vec<String>> {
        Ok(self.connection.tables(database)?)
    }

    /// Run `SELECT 1`.
    pub fn test_connection(&self) -> Result<()> {
        self.connection.query("SELECT 1")?;
        Ok(())
    }
}

/// Source column feeding a target column, by case-insensitive name.
fn source_column<'a>(source: &'a TableSpec, target: &ColumnInfo) -> Option<&'a ColumnSpec> {
    source
        .live_columns()
        .find(|column| column.db_name.eq_ignore_ascii_case(&target.name))
}

fn insert_select_sql(source: &TableSpec, target_table: &str, target: &[ColumnInfo]) -> String {
    let select: Vec<String> = target
        .iter()
        .map(|column| match source_column(source, column) {
            Some(spec) => quote_identifier(&spec.db_name),
            None => sql::NULL.to_string(),
        })
        .collect();

    format!(
        "INSERT INTO {} SELECT {} FROM {}",
        quote_identifier(target_table),
        select.join(", "),
        quote_identifier(&source.db_name)
    )
}

fn merge_sql(source: &TableSpec, target_table: &str, target: &[ColumnInfo]) -> String {
    let on: Vec<String> = source
        .primary_key
        .iter()
        .map(|key| format!("{} = {}", sql::qualified("dst", key), sql::qualified("src", key)))
        .collect();

    let updates: Vec<String> = target
        .iter()
        .filter(|column| !source.is_primary_key(&column.name))
        .filter_map(|column| source_column(source, column))
        .map(|spec| {
            format!(
                "{} = {}",
                quote_identifier(&spec.db_name),
                sql::qualified("src", &spec.db_name)
            )
        })
        .collect();

    let values: Vec<String> = target
        .iter()
        .map(|column| match source_column(source, column) {
            Some(spec) => sql::qualified("src", &spec.db_name),
            None => sql::NULL.to_string(),
        })
        .collect();

    let mut statement = format!(
        "MERGE INTO {} AS `dst` USING {} AS `src` ON {}",
        quote_identifier(target_table),
        quote_identifier(&source.db_name),
        on.join(" AND ")
    );
    if !updates.is_empty() {
        statement.push_str(&format!(" WHEN MATCHED THEN UPDATE SET {}", updates.join(", ")));
    }
    statement.push_str(&format!(
        " WHEN NOT MATCHED THEN INSERT VALUES ({})",
        values.join(", ")
    ));
    statement
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Row;
    use std::sync::RwLock;

    /// In-memory connection recording every statement.
    #[derive(Default)]
    struct MockConnection {
        executed: RwLock<Vec<String>>,
        tables: RwLock<HashMap<String, Vec<ColumnInfo>>>,
        reflection_fails: bool,
        fail_on: Option<String>,
    }

    impl MockConnection {
        fn with_table(name: &str, columns: Vec<ColumnInfo>) -> Self {
            let mock = Self::default();
            mock.tables.write().unwrap().insert(name.to_string(), columns);
            mock
        }

        fn executed(&self) -> Vec<String> {
            self.executed.read().unwrap().clone()
        }
    }

    impl HiveConnection for MockConnection {
        fn execute(&self, sql: &str) -> std::result::Result<(), DriverError> {
            self.executed.write().unwrap().push(sql.to_string());
            match &self.fail_on {
                Some(fragment) if sql.contains(fragment.as_str()) => {
                    Err(DriverError::new("Table not found"))
                }
                _ => Ok(()),
            }
        }

        fn query(&self, sql: &str) -> std::result::Result<Vec<Row>, DriverError> {
            self.executed.write().unwrap().push(sql.to_string());
            Ok(vec![vec![Some("1".to_string())]])
        }

        fn columns(&self, table: &str) -> std::result::Result<Vec<ColumnInfo>, DriverError> {
            Ok(self
                .tables
                .read()
                .unwrap()
                .get(table)
                .cloned()
                .unwrap_or_default())
        }

        fn tables(&self, _schema: &str) -> std::result::Result<Vec<String>, DriverError> {
            if self.reflection_fails {
                return Err(DriverError::new("SQLTables not supported"));
            }
            Ok(self.tables.read().unwrap().keys().cloned().collect())
        }
    }

    fn capabilities(merge_supported: bool) -> ServerCapabilities {
        ServerCapabilities {
            version: Some("2.3.6".into()),
            merge_supported,
            legacy_escaping: false,
        }
    }

    fn column(name: &str, column_type: &str) -> ColumnSpec {
        ColumnSpec {
            name: name.into(),
            db_name: name.into(),
            column_type: column_type.into(),
            size: None,
            nullable: false,
            default: None,
        }
    }

    fn table(name: &str, items: Vec<ColumnSpec>) -> TableSpec {
        TableSpec {
            table_id: format!("in.c-main.{}", name),
            db_name: name.into(),
            incremental: false,
            export: true,
            primary_key: vec![],
            items,
            temporary: false,
        }
    }

    fn writer(mock: MockConnection, merge_supported: bool) -> HiveWriter<MockConnection> {
        HiveWriter::with_capabilities(mock, "default", capabilities(merge_supported))
    }

    #[test]
    fn test_allowed_types() {
        assert_eq!(allowed_types().len(), 15);
        assert!(allowed_types().contains(&"binary"));
        assert!(check_column_type(&column("a", "VARCHAR")).is_ok());
        assert!(check_column_type(&column("a", "text")).is_err());
    }

    #[test]
    fn test_batch_size() {
        assert_eq!(batch_size(1), 2999);
        assert_eq!(batch_size(2), 1499);
        assert_eq!(batch_size(7), 427);
        assert_eq!(batch_size(3000), 1);
        assert_eq!(batch_size(10_000), 1);
    }

    #[test]
    fn test_generate_tmp_name() {
        let name = generate_tmp_name("products");
        let suffix = name.strip_prefix("products_temp_").unwrap();
        assert_eq!(suffix.len(), 32);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(name, generate_tmp_name("products"));
    }

    #[test]
    fn test_create_emits_columns_without_constraints() {
        let mut b = column("b", "varchar");
        b.size = Some("20".into());
        b.nullable = true;
        b.default = Some("x".into());
        let mut a = column("a", "int");
        a.size = Some("10".into());
        let spec = table("t", vec![a, b, column("skip", "ignore")]);

        let writer = writer(MockConnection::default(), false);
        writer.create(&spec).unwrap();

        let executed = writer.connection().executed();
        assert_eq!(
            executed,
            vec!["CREATE TABLE `t` (`a` int, `b` varchar(20)) STORED AS ORC".to_string()]
        );
        let ddl = &executed[0];
        assert!(!ddl.contains("NOT NULL"));
        assert!(!ddl.contains("DEFAULT"));
        assert!(!ddl.contains("PRIMARY KEY"));
        assert!(!ddl.contains("skip"));
    }

    #[test]
    fn test_create_incremental_with_key_is_transactional() {
        let mut spec = table("t", vec![column("id", "int"), column("name", "string")]);
        spec.incremental = true;
        spec.primary_key = vec!["id".into()];

        let writer = writer(MockConnection::default(), true);
        writer.create(&spec).unwrap();

        assert_eq!(
            writer.connection().executed()[0],
            "CREATE TABLE `t` (`id` int, `name` string) CLUSTERED BY (`id`) INTO 1 BUCKETS STORED AS ORC TBLPROPERTIES ('transactional'='true')"
        );
    }

    #[test]
    fn test_create_temporary_staging_table() {
        let mut spec = table("t", vec![column("id", "int")]);
        spec.incremental = true;
        spec.primary_key = vec!["id".into()];
        let staging = spec.staging("t_temp_1");

        let writer = writer(MockConnection::default(), false);
        writer.create(&staging).unwrap();

        assert_eq!(
            writer.connection().executed()[0],
            "CREATE TEMPORARY TABLE `t_temp_1` (`id` int) STORED AS ORC"
        );
    }

    #[test]
    fn test_create_without_merge_support_fails_before_sql() {
        let mut spec = table("t", vec![column("id", "int")]);
        spec.incremental = true;
        spec.primary_key = vec!["id".into()];

        let writer = writer(MockConnection::default(), false);
        let err = writer.create(&spec).unwrap_err();

        assert!(matches!(err, Error::Capability(_)));
        assert!(writer.connection().executed().is_empty());
    }

    #[test]
    fn test_create_unsupported_type_fails_before_sql() {
        let spec = table("t", vec![column("id", "int"), column("doc", "json")]);

        let writer = writer(MockConnection::default(), true);
        let err = writer.create(&spec).unwrap_err();

        assert!(matches!(err, Error::Schema(SchemaError::UnsupportedType { .. })));
        assert!(err.to_string().contains("\"doc\""));
        assert!(writer.connection().executed().is_empty());
    }

    #[test]
    fn test_write_orders_values_by_table_columns() {
        let spec = table("t", vec![column("z", "string"), column("x", "string")]);
        let csv = "x,y,z\n1,2,3\n4,5,6\n";

        let writer = writer(MockConnection::default(), true);
        let rows = writer.write(csv.as_bytes(), &spec).unwrap();

        assert_eq!(rows, 2);
        assert_eq!(
            writer.connection().executed(),
            vec!["INSERT INTO `t` VALUES ('3', '1'), ('6', '4')".to_string()]
        );
    }

    #[test]
    fn test_write_fills_missing_columns_with_null() {
        let mut nullable = column("note", "string");
        nullable.nullable = true;
        let spec = table(
            "t",
            vec![column("id", "int"), column("missing", "string"), nullable],
        );
        let csv = "id,note\n1,\n2,it's\n";

        let writer = writer(MockConnection::default(), true);
        writer.write(csv.as_bytes(), &spec).unwrap();

        assert_eq!(
            writer.connection().executed()[0],
            r"INSERT INTO `t` VALUES ('1', NULL, NULL), ('2', NULL, 'it\'s')"
        );
    }

    #[test]
    fn test_write_empty_value_in_required_column_is_empty_string() {
        let spec = table("t", vec![column("a", "string")]);
        let writer = writer(MockConnection::default(), true);
        writer.write("a\n\"\"\n".as_bytes(), &spec).unwrap();

        assert_eq!(writer.connection().executed()[0], "INSERT INTO `t` VALUES ('')");
    }

    #[test]
    fn test_write_batches() {
        let items: Vec<ColumnSpec> = (0..1000).map(|i| column(&format!("c{}", i), "string")).collect();
        let header: Vec<String> = (0..1000).map(|i| format!("c{}", i)).collect();
        let row = vec!["v"; 1000].join(",");
        let csv = format!("{}\n{}\n{}\n{}\n", header.join(","), row, row, row);

        let writer = writer(MockConnection::default(), true);
        let rows = writer.write(csv.as_bytes(), &table("wide", items)).unwrap();

        // 3000 / 1000 - 1 = 2 rows per statement
        assert_eq!(rows, 3);
        let executed = writer.connection().executed();
        assert_eq!(executed.len(), 2);
        assert_eq!(executed[0].matches("), (").count(), 1);
        assert!(!executed[1].contains("), ("));
    }

    #[test]
    fn test_write_empty_csv_sends_nothing() {
        let spec = table("t", vec![column("a", "string")]);
        let writer = writer(MockConnection::default(), true);

        assert_eq!(writer.write("a\n".as_bytes(), &spec).unwrap(), 0);
        assert!(writer.connection().executed().is_empty());
    }

    #[test]
    fn test_write_legacy_escaping() {
        let spec = table("t", vec![column("a", "string")]);
        let caps = ServerCapabilities {
            version: Some("1.1.1".into()),
            merge_supported: false,
            legacy_escaping: true,
        };
        let writer = HiveWriter::with_capabilities(MockConnection::default(), "default", caps);
        writer.write("a\nit's \\\n".as_bytes(), &spec).unwrap();

        assert_eq!(writer.connection().executed()[0], r"INSERT INTO `t` VALUES ('it''s \')");
    }

    #[test]
    fn test_write_file_missing() {
        let spec = table("t", vec![column("a", "string")]);
        let writer = writer(MockConnection::default(), true);
        let err = writer.write_file(Path::new("/nonexistent/t.csv"), &spec).unwrap_err();

        assert!(matches!(err, Error::Csv(_)));
    }

    #[test]
    fn test_upsert_merge_excludes_keys_from_update() {
        let target = vec![
            ColumnInfo::new("id", "INT"),
            ColumnInfo::new("name", "STRING"),
            ColumnInfo::new("age", "INT"),
        ];
        let mut spec = table(
            "people",
            vec![column("id", "int"), column("name", "string"), column("age", "int")],
        );
        spec.incremental = true;
        spec.primary_key = vec!["id".into()];
        let staging = spec.staging("people_temp_1");

        let writer = writer(MockConnection::with_table("people", target), true);
        writer.upsert(&staging, "people").unwrap();

        let sql = &writer.connection().executed()[0];
        assert_eq!(
            sql,
            "MERGE INTO `people` AS `dst` USING `people_temp_1` AS `src` ON `dst`.`id` = `src`.`id` \
             WHEN MATCHED THEN UPDATE SET `name` = `src`.`name`, `age` = `src`.`age` \
             WHEN NOT MATCHED THEN INSERT VALUES (`src`.`id`, `src`.`name`, `src`.`age`)"
        );
        let update = sql.split("UPDATE SET").nth(1).unwrap().split("WHEN NOT").next().unwrap();
        assert!(!update.contains("`id`"));
    }

    #[test]
    fn test_upsert_merge_only_keys_omits_matched_branch() {
        let target = vec![ColumnInfo::new("a", "INT"), ColumnInfo::new("b", "INT")];
        let mut spec = table("k", vec![column("a", "int"), column("b", "int")]);
        spec.primary_key = vec!["a".into(), "b".into()];

        let writer = writer(MockConnection::with_table("k", target), true);
        writer.upsert(&spec.staging("k_tmp"), "k").unwrap();

        let sql = &writer.connection().executed()[0];
        assert!(sql.contains("ON `dst`.`a` = `src`.`a` AND `dst`.`b` = `src`.`b`"));
        assert!(!sql.contains("WHEN MATCHED"));
    }

    #[test]
    fn test_upsert_merge_requires_support() {
        let mut spec = table("t", vec![column("id", "int")]);
        spec.primary_key = vec!["id".into()];
        let mock = MockConnection::with_table("t", vec![ColumnInfo::new("id", "INT")]);

        let writer = writer(mock, false);
        let err = writer.upsert(&spec.staging("t_tmp"), "t").unwrap_err();

        assert!(matches!(err, Error::Capability(_)));
        assert!(writer.connection().executed().is_empty());
    }

    #[test]
    fn test_upsert_without_key_selects_null_for_unknown_columns() {
        let target = vec![
            ColumnInfo::new("extra", "STRING"),
            ColumnInfo::new("id", "INT"),
            ColumnInfo::new("name", "STRING"),
        ];
        let spec = table("t", vec![column("name", "string"), column("id", "int")]);

        let writer = writer(MockConnection::with_table("t", target), true);
        writer.upsert(&spec.staging("t_tmp"), "t").unwrap();

        assert_eq!(
            writer.connection().executed()[0],
            "INSERT INTO `t` SELECT NULL, `id`, `name` FROM `t_tmp`"
        );
    }

    #[test]
    fn test_table_exists_uses_reflection() {
        let writer = writer(MockConnection::with_table("present", vec![]), true);

        assert!(writer.table_exists("present"));
        assert!(writer.table_exists("PRESENT"));
        assert!(!writer.table_exists("absent"));
        assert!(writer.connection().executed().is_empty());
    }

    #[test]
    fn test_table_exists_falls_back_to_select() {
        let mock = MockConnection {
            reflection_fails: true,
            fail_on: Some("`absent`".into()),
            ..Default::default()
        };
        let writer = writer(mock, true);

        assert!(writer.table_exists("present"));
        assert!(!writer.table_exists("absent"));
        assert_eq!(
            writer.connection().executed(),
            vec![
                "SELECT 1 FROM `present` LIMIT 1".to_string(),
                "SELECT 1 FROM `absent` LIMIT 1".to_string()
            ]
        );
    }

    #[test]
    fn test_validate_table_missing_column() {
        let mock = MockConnection::with_table("t", vec![ColumnInfo::new("id", "INT")]);
        let spec = table("t", vec![column("id", "int"), column("name", "string")]);

        let err = writer(mock, true).validate_table(&spec).unwrap_err();
        assert!(matches!(err, Error::Schema(SchemaError::ColumnNotFound { .. })));
        assert!(err.to_string().contains("\"name\""));
    }

    #[test]
    fn test_validate_table_type_mismatch() {
        let mock = MockConnection::with_table(
            "t",
            vec![ColumnInfo::new("id", "INT"), ColumnInfo::new("name", "INT")],
        );
        let spec = table("t", vec![column("id", "int"), column("name", "string")]);

        let err = writer(mock, true).validate_table(&spec).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("\"string\""));
        assert!(message.contains("\"INT\""));
    }

    #[test]
    fn test_validate_table_case_insensitive() {
        let mock = MockConnection::with_table(
            "t",
            vec![ColumnInfo::new("id", "INT"), ColumnInfo::new("name", "STRING")],
        );
        let spec = table(
            "t",
            vec![column("ID", "int"), column("Name", "String"), column("x", "ignore")],
        );

        assert!(writer(mock, true).validate_table(&spec).is_ok());
    }

    #[test]
    fn test_reflection_pass_through() {
        let columns = vec![ColumnInfo::new("id", "INT")];
        let writer = writer(MockConnection::with_table("t", columns.clone()), true);

        assert_eq!(writer.get_table_info("t").unwrap(), columns);
        assert_eq!(writer.show_tables("default").unwrap(), vec!["t".to_string()]);
    }

    #[test]
    fn test_drop_and_test_connection() {
        let writer = writer(MockConnection::default(), true);
        writer.drop("old").unwrap();
        writer.test_connection().unwrap();

        assert_eq!(
            writer.connection().executed(),
            vec!["DROP TABLE IF EXISTS `old`".to_string(), "SELECT 1".to_string()]
        );
    }
}
