//! Error types for the Hive writer core library.
//!
//! Uses hierarchical domain-specific errors following the thiserror pattern.
//! Every variant except [`Error::Io`] and [`Error::Internal`] is a user error:
//! it is caused by configuration, data or server state and is reported with a
//! descriptive message. Internal errors are unexpected and fatal for the run.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Hive writer operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for the Hive writer.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// CA certificate could not be resolved or materialized
    #[error("Certificate error: {0}")]
    Certificate(#[from] CertificateError),

    /// Driver refused the connection
    #[error("Error connecting to DB: {0}")]
    Connection(String),

    /// SSH tunnel could not be established
    #[error("SSH tunnel error: {0}")]
    Tunnel(String),

    /// Operation needs a server feature the connected Hive does not have
    #[error("Unsupported server capability: {0}")]
    Capability(String),

    /// Table definition or destination schema problem
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// SQL statement failed on the server
    #[error("Query failed: {0}")]
    Query(#[from] DriverError),

    /// CSV input error
    #[error("CSV error: {0}")]
    Csv(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Unexpected failure
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the error should be reported to the user as-is.
    pub fn is_user_error(&self) -> bool {
        !matches!(self, Error::Io(_) | Error::Internal(_))
    }
}

/// CA certificate errors.
#[derive(Error, Debug)]
pub enum CertificateError {
    /// `internal:` reference with characters outside the allowed set
    #[error("The \"ca\" parameter is invalid. The filename \"{0}\" contains illegal characters.")]
    InvalidFileName(String),

    /// `internal:` reference without a bundled files directory
    #[error("Cannot load internal certificate \"{0}\": bundled files directory is not configured.")]
    BundledFilesNotConfigured(String),

    /// Bundled certificate file missing or empty
    #[error("Certificate \"{}\" not found.", .0.display())]
    NotFound(PathBuf),

    /// Bundled certificate file exists but cannot be read
    #[error("Cannot read certificate \"{}\": {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// CA bundle could not be written to disk
    #[error("Cannot write CA certificate bundle \"{}\": {source}", .path.display())]
    Materialize {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JKS payload is not valid base64
    #[error("Cannot base64 decode CA parameter \"{parameter}\": {message}")]
    Base64Decode { parameter: String, message: String },

    /// keytool failed or produced no certificates
    #[error("Cannot convert CA certificate bundle from JKS to PEM format: {output}")]
    Conversion { output: String },
}

/// Table definition and destination schema errors.
#[derive(Error, Debug)]
pub enum SchemaError {
    /// Column type outside the allowed set
    #[error("Type \"{type_name}\" of column \"{column}\" is not supported. Allowed types: {allowed}.")]
    UnsupportedType {
        column: String,
        type_name: String,
        allowed: String,
    },

    /// Exported table without any columns
    #[error("Table \"{0}\" has no columns to export.")]
    NoColumns(String),

    /// Primary key refers to a column that is not configured
    #[error("Primary key column \"{column}\" is not defined in table \"{table}\".")]
    UnknownPrimaryKey { table: String, column: String },

    /// Configured column missing in the destination table
    #[error("Column \"{column}\" not found in destination table \"{table}\".")]
    ColumnNotFound { table: String, column: String },

    /// Configured and destination column types differ
    #[error(
        "Data type mismatch. Column \"{column}\" is of type \"{configured}\" in writer, but is \"{destination}\" in destination table \"{table}\"."
    )]
    TypeMismatch {
        table: String,
        column: String,
        configured: String,
        destination: String,
    },
}

/// Error reported by the database driver for a single statement.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct DriverError {
    /// Driver diagnostic text
    pub message: String,
}

impl DriverError {
    /// Create a driver error from a diagnostic message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<odbc_api::Error> for DriverError {
    fn from(err: odbc_api::Error) -> Self {
        DriverError::new(err.to_string())
    }
}

// Conversion implementations for external error types

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Self {
        Error::Csv(err.to_string())
    }
}
