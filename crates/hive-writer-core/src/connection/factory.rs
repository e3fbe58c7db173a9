//! Connection factory: parameter validation, TLS, SSH tunnel and DSN assembly.

use super::{HiveConnection, OdbcConnection};
use crate::certs::CertManager;
use crate::config::ConnectionParams;
use crate::dsn::{self, DsnParameters};
use crate::tunnel::SshTunnel;
use crate::{Error, Result};
use std::path::PathBuf;
use tracing::{debug, info};

/// Statement run right after connecting so result columns are not prefixed
/// with the table name (`price`, not `product.price`).
const SESSION_SETUP: &str = "set hive.resultset.use.unique.column.names=false";

/// Live connection plus the resources it depends on.
///
/// Fields drop in declaration order: the connection closes before the CA
/// bundle is removed and the tunnel is stopped.
pub struct HiveSession {
    connection: OdbcConnection,
    _cert_manager: CertManager,
    _tunnel: Option<SshTunnel>,
}

impl HiveSession {
    /// The live connection.
    pub fn connection(&self) -> &OdbcConnection {
        &self.connection
    }
}

/// Opens Hive connections from configuration.
#[derive(Debug, Clone, Default)]
pub struct ConnectionFactory {
    /// Directory holding `internal:` certificates
    bundled_files_dir: Option<PathBuf>,
}

impl ConnectionFactory {
    /// Create a factory.
    pub fn new(bundled_files_dir: Option<PathBuf>) -> Self {
        Self { bundled_files_dir }
    }

    /// Validate parameters and open a connection.
    pub fn create_connection(&self, params: &ConnectionParams) -> Result<HiveSession> {
        let host = required(&params.host, "host")?;
        let database = required(&params.database, "database")?;
        let user = required(&params.user, "user")?;
        let password = required(&params.password, "#password")?;

        let tunnel = match &params.ssh {
            Some(ssh) if ssh.enabled => Some(SshTunnel::open(ssh, host, params.port())?),
            _ => None,
        };
        let (host, port) = match &tunnel {
            Some(tunnel) => (tunnel.local_host(), tunnel.local_port()),
            None => (host, params.port()),
        };

        let mut cert_manager = CertManager::new(params.ssl.clone(), self.bundled_files_dir.clone());
        let ssl_params = cert_manager.dsn_parameters()?;
        let transport_params = transport_parameters(params);

        let dsn = dsn::build_dsn(host, port, database, &ssl_params, &transport_params);
        debug!(dsn = %dsn, "Connecting to Hive");

        let connection_string = dsn::with_credentials(&dsn, user, password);
        let connection = OdbcConnection::connect(&connection_string, database)
            .map_err(|e| Error::Connection(e.message))?;

        connection.execute(SESSION_SETUP)?;

        info!(
            host = %host,
            port = port,
            database = %database,
            ssl = !ssl_params.is_empty(),
            "Connected to Hive"
        );

        Ok(HiveSession {
            connection,
            _cert_manager: cert_manager,
            _tunnel: tunnel,
        })
    }
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str> {
    value
        .as_deref()
        .ok_or_else(|| Error::Config(format!("Parameter {} is missing.", name)))
}

/// HTTP transport parameters, present only when configured.
pub(crate) fn transport_parameters(params: &ConnectionParams) -> DsnParameters {
    let mut parameters = DsnParameters::new();

    if let Some(transport) = params.thrift_transport.as_deref().filter(|t| !t.is_empty()) {
        parameters.insert("ThriftTransport", transport);
    }

    if let Some(path) = params.http_path.as_deref().filter(|p| !p.is_empty()) {
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };
        parameters.insert("HTTPPath", path);
    }

    parameters
}
