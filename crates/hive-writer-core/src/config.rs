//! Configuration structures for the Hive writer.
//!
//! Configuration is loaded from a `config.json` file in the data directory (or
//! a TOML file) and describes the connection plus the tables to export. Two
//! layouts are accepted: the single-table "row" layout, where the table fields
//! sit directly under `parameters`, and the legacy layout with a `tables` list.
//! Both are flattened into a list of [`TableSpec`] by
//! [`Parameters::table_specs`].

use crate::error::SchemaError;
use crate::writer;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default HiveServer2 port.
pub const DEFAULT_PORT: u16 = 10000;

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Action to execute
    #[serde(default)]
    pub action: Action,

    /// Writer parameters
    pub parameters: Parameters,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Writer action.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    /// Load all exported tables
    #[default]
    Run,
    /// Open a connection and issue `SELECT 1`
    TestConnection,
    /// Report columns of every table in the database
    GetTablesInfo,
}

impl Action {
    /// Sync actions answer with a JSON document and log only errors.
    pub fn is_sync(&self) -> bool {
        !matches!(self, Action::Run)
    }
}

/// Writer parameters.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Parameters {
    /// Data directory (CSV inputs live under `in/tables/`)
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// Writer implementation name
    #[serde(default = "default_writer_class")]
    pub writer_class: String,

    /// Connection parameters
    pub db: ConnectionParams,

    /// Legacy layout: list of tables
    #[serde(default)]
    pub tables: Vec<TableSpec>,

    /// Row layout: source table id
    #[serde(default, rename = "tableId")]
    pub table_id: Option<String>,

    /// Row layout: destination table name
    #[serde(default, rename = "dbName")]
    pub db_name: Option<String>,

    /// Row layout: incremental load
    #[serde(default)]
    pub incremental: bool,

    /// Row layout: export flag
    #[serde(default = "default_true")]
    pub export: bool,

    /// Row layout: primary key columns
    #[serde(default, rename = "primaryKey")]
    pub primary_key: Vec<String>,

    /// Row layout: columns
    #[serde(default)]
    pub items: Vec<ColumnSpec>,
}

impl Parameters {
    /// Flatten the row or legacy layout into table specifications.
    pub fn table_specs(&self) -> Vec<TableSpec> {
        match &self.table_id {
            Some(table_id) => vec![TableSpec {
                table_id: table_id.clone(),
                db_name: self.db_name.clone().unwrap_or_else(|| table_id.clone()),
                incremental: self.incremental,
                export: self.export,
                primary_key: self.primary_key.clone(),
                items: self.items.clone(),
                temporary: false,
            }],
            None => self.tables.clone(),
        }
    }
}

/// Hive connection parameters.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionParams {
    /// Server host
    #[serde(default)]
    pub host: Option<String>,

    /// Server port (number or numeric string)
    #[serde(default, deserialize_with = "de::opt_port")]
    pub port: Option<u16>,

    /// Database (schema) name
    #[serde(default)]
    pub database: Option<String>,

    /// User name
    #[serde(default)]
    pub user: Option<String>,

    /// Password, also accepted as the encrypted `#password` key
    #[serde(default, alias = "#password")]
    pub password: Option<String>,

    /// SSH tunnel configuration
    #[serde(default)]
    pub ssh: Option<SshConfig>,

    /// TLS configuration
    #[serde(default)]
    pub ssl: Option<SslConfig>,

    /// HTTP transport path
    #[serde(default)]
    pub http_path: Option<String>,

    /// Thrift transport mode
    #[serde(default, deserialize_with = "de::opt_scalar")]
    pub thrift_transport: Option<String>,
}

impl ConnectionParams {
    /// Port, falling back to the HiveServer2 default.
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    /// Check that every parameter required to connect is present.
    ///
    /// The first missing parameter is named in the error.
    pub fn check_required(&self) -> Result<()> {
        let required = [
            ("host", &self.host),
            ("database", &self.database),
            ("user", &self.user),
            ("#password", &self.password),
        ];

        for (name, value) in required {
            if value.is_none() {
                return Err(Error::Config(format!("Parameter {} is missing.", name)));
            }
        }

        Ok(())
    }
}

/// TLS configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SslConfig {
    /// Enable TLS
    #[serde(default)]
    pub enabled: bool,

    /// CA certificate: PEM text, base64 JKS, or `internal:<filename>`
    #[serde(default, alias = "#ca")]
    pub ca: Option<String>,

    /// Format of `ca`
    #[serde(default)]
    pub ca_file_type: CaFileType,

    /// Reject self-signed server certificates
    #[serde(default = "default_true")]
    pub verify_server_cert: bool,

    /// Accept certificates whose CN does not match the host
    #[serde(default)]
    pub ignore_certificate_cn: bool,
}

impl Default for SslConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ca: None,
            ca_file_type: CaFileType::default(),
            verify_server_cert: true,
            ignore_certificate_cn: false,
        }
    }
}

/// CA certificate file type.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CaFileType {
    /// PEM text (default)
    #[default]
    Pem,
    /// Base64-encoded Java keystore
    Jks,
}

/// SSH tunnel configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SshConfig {
    /// Enable the tunnel
    #[serde(default)]
    pub enabled: bool,

    /// Key pair used to authenticate against the bastion
    #[serde(default)]
    pub keys: SshKeys,

    /// Bastion host
    #[serde(default)]
    pub ssh_host: Option<String>,

    /// Bastion port
    #[serde(default = "default_ssh_port", deserialize_with = "de::port")]
    pub ssh_port: u16,

    /// Host to forward to (defaults to the database host)
    #[serde(default)]
    pub remote_host: Option<String>,

    /// Port to forward to (defaults to the database port)
    #[serde(default, deserialize_with = "de::opt_port")]
    pub remote_port: Option<u16>,

    /// Local end of the tunnel
    #[serde(default = "default_local_port", deserialize_with = "de::port")]
    pub local_port: u16,

    /// Bastion user
    #[serde(default)]
    pub user: Option<String>,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            keys: SshKeys::default(),
            ssh_host: None,
            ssh_port: default_ssh_port(),
            remote_host: None,
            remote_port: None,
            local_port: default_local_port(),
            user: None,
        }
    }
}

/// SSH key pair.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SshKeys {
    /// Private key, also accepted as the encrypted `#private` key
    #[serde(default, alias = "#private")]
    pub private: Option<String>,

    /// Public key (informational)
    #[serde(default)]
    pub public: Option<String>,
}

/// Table to export.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSpec {
    /// Source table id; the CSV file is `in/tables/<tableId>.csv`
    pub table_id: String,

    /// Destination table name
    pub db_name: String,

    /// Upsert into an existing table instead of replacing it
    #[serde(default)]
    pub incremental: bool,

    /// Skip the table when false
    #[serde(default = "default_true")]
    pub export: bool,

    /// Destination primary key columns
    #[serde(default)]
    pub primary_key: Vec<String>,

    /// Columns in destination order
    #[serde(default)]
    pub items: Vec<ColumnSpec>,

    /// Staging table created as `TEMPORARY`
    #[serde(skip)]
    pub temporary: bool,
}

impl TableSpec {
    /// Columns that take part in DDL and DML (type is not `ignore`).
    pub fn live_columns(&self) -> impl Iterator<Item = &ColumnSpec> + '_ {
        self.items.iter().filter(|column| !column.is_ignored())
    }

    /// Whether `db_name` is one of the primary key columns.
    pub fn is_primary_key(&self, db_name: &str) -> bool {
        self.primary_key
            .iter()
            .any(|key| key.eq_ignore_ascii_case(db_name))
    }

    /// Loads into this table must go through MERGE.
    pub fn requires_merge(&self) -> bool {
        self.incremental && !self.primary_key.is_empty() && !self.temporary
    }

    /// Copy of this table renamed for staging.
    pub fn staging(&self, tmp_name: impl Into<String>) -> TableSpec {
        TableSpec {
            db_name: tmp_name.into(),
            temporary: true,
            ..self.clone()
        }
    }

    /// Validate the column definitions.
    pub fn validate(&self) -> Result<()> {
        if !self.export {
            return Ok(());
        }

        if self.live_columns().next().is_none() {
            return Err(SchemaError::NoColumns(self.db_name.clone()).into());
        }

        for column in self.live_columns() {
            writer::check_column_type(column)?;
        }

        for key in &self.primary_key {
            let defined = self
                .live_columns()
                .any(|column| column.db_name.eq_ignore_ascii_case(key));
            if !defined {
                return Err(SchemaError::UnknownPrimaryKey {
                    table: self.db_name.clone(),
                    column: key.clone(),
                }
                .into());
            }
        }

        Ok(())
    }
}

/// Column definition.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnSpec {
    /// CSV header name
    pub name: String,

    /// Destination column name
    pub db_name: String,

    /// Hive type, case-insensitive; `ignore` drops the column
    #[serde(rename = "type")]
    pub column_type: String,

    /// Size for char, varchar and decimal
    #[serde(default, deserialize_with = "de::opt_scalar")]
    pub size: Option<String>,

    /// Empty values load as NULL
    #[serde(default)]
    pub nullable: bool,

    /// Default value (Hive has no column defaults; kept for validation only)
    #[serde(default, deserialize_with = "de::opt_scalar")]
    pub default: Option<String>,
}

impl ColumnSpec {
    /// Whether the column is excluded from DDL and DML.
    pub fn is_ignored(&self) -> bool {
        self.column_type.eq_ignore_ascii_case("ignore")
    }

    /// Lower-cased type name.
    pub fn type_name(&self) -> String {
        self.column_type.to_ascii_lowercase()
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log format
    #[serde(default)]
    pub format: LogFormat,

    /// Log level
    #[serde(default)]
    pub level: LogLevel,
}

/// Log level.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level
    Trace,
    /// Debug level
    Debug,
    /// Info level (default)
    #[default]
    Info,
    /// Warn level
    Warn,
    /// Error level
    Error,
}

impl LogLevel {
    /// Directive usable with `EnvFilter`.
    pub fn as_directive(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Plain text format (default)
    #[default]
    Text,
    /// JSON format
    Json,
}

impl Config {
    /// Load configuration from a JSON or TOML file (chosen by extension).
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Cannot read configuration file {}: {}",
                path.display(),
                e
            ))
        })?;

        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        if is_toml {
            Ok(toml::from_str(&content)?)
        } else {
            Ok(serde_json::from_str(&content)?)
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        self.parameters.db.check_required()?;

        if let Some(ssl) = &self.parameters.db.ssl {
            if ssl.enabled && ssl.ca_file_type == CaFileType::Jks && ssl.ca.is_none() {
                return Err(Error::Config(
                    "The \"ca\" parameter is required when \"caFileType\" is \"jks\".".into(),
                ));
            }
        }

        if let Some(ssh) = &self.parameters.db.ssh {
            if ssh.enabled && ssh.ssh_host.is_none() {
                return Err(Error::Config("SSH host is required when SSH is enabled".into()));
            }
        }

        let tables = self.parameters.table_specs();
        if self.action == Action::Run && tables.is_empty() {
            tracing::warn!("No tables configured, nothing will be written");
        }

        for table in &tables {
            table.validate()?;
        }

        Ok(())
    }
}

// Default value functions
fn default_writer_class() -> String {
    "Hive".to_string()
}
fn default_true() -> bool {
    true
}
fn default_ssh_port() -> u16 {
    22
}
fn default_local_port() -> u16 {
    33006
}

/// Lenient deserializers for values that arrive either as numbers or strings.
mod de {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Str(String),
        Int(i64),
        Float(f64),
        Bool(bool),
    }

    impl Scalar {
        fn into_string(self) -> String {
            match self {
                Scalar::Str(s) => s,
                Scalar::Int(i) => i.to_string(),
                Scalar::Float(f) => f.to_string(),
                Scalar::Bool(b) => b.to_string(),
            }
        }
    }

    pub fn opt_scalar<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<Scalar>::deserialize(deserializer)?.map(Scalar::into_string))
    }

    pub fn port<'de, D>(deserializer: D) -> Result<u16, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Scalar::deserialize(deserializer)?.into_string();
        raw.trim()
            .parse::<u16>()
            .map_err(|_| D::Error::custom(format!("invalid port \"{}\"", raw)))
    }

    pub fn opt_port<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<Scalar>::deserialize(deserializer)? {
            None => Ok(None),
            Some(scalar) => {
                let raw = scalar.into_string();
                if raw.trim().is_empty() {
                    return Ok(None);
                }
                raw.trim()
                    .parse::<u16>()
                    .map(Some)
                    .map_err(|_| D::Error::custom(format!("invalid port \"{}\"", raw)))
            }
        }
    }
}
