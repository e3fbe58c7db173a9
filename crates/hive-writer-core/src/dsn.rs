//! ODBC connection string rendering.

use std::fmt;

/// ODBC driver registered by the Cloudera Hive driver package.
pub const DRIVER_NAME: &str = "Cloudera ODBC Driver for Apache Hive 64-bit";

/// Ordered `key=value` connection-string parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DsnParameters(Vec<(String, String)>);

impl DsnParameters {
    /// Create an empty parameter list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a parameter, replacing an existing value in place.
    pub fn insert(&mut self, key: impl Into<String>, value: impl ToString) {
        let key = key.into();
        let value = value.to_string();
        match self.0.iter_mut().find(|(existing, _)| *existing == key) {
            Some(entry) => entry.1 = value,
            None => self.0.push((key, value)),
        }
    }

    /// Look up a parameter.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for DsnParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            write!(f, "{}={}", key, value)?;
        }
        Ok(())
    }
}

/// Render the connection string for a Hive server.
///
/// Fragments keep the order of the given mappings: driver identity, network
/// target and auth markers first, then SSL parameters, then transport
/// parameters.
pub fn build_dsn(
    host: &str,
    port: u16,
    database: &str,
    ssl_params: &DsnParameters,
    transport_params: &DsnParameters,
) -> String {
    let mut dsn = format!(
        "Driver={};Host={};Port={};Schema={};AuthMech=3;UseNativeQuery=1",
        DRIVER_NAME, host, port, database
    );

    for (key, value) in ssl_params.iter().chain(transport_params.iter()) {
        dsn.push(';');
        dsn.push_str(key);
        dsn.push('=');
        dsn.push_str(value);
    }

    dsn
}

/// Append credentials to a connection string.
///
/// User and password are wrapped in braces so `;` and `=` inside them
/// survive; a closing brace is escaped by doubling.
pub fn with_credentials(dsn: &str, user: &str, password: &str) -> String {
    format!("{};UID={};PWD={}", dsn, braced(user), braced(password))
}

fn braced(value: &str) -> String {
    format!("{{{}}}", value.replace('}', "}}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_dsn_without_ssl() {
        let dsn = build_dsn("h", 10000, "db", &DsnParameters::new(), &DsnParameters::new());

        assert!(dsn.contains("Driver=Cloudera ODBC Driver for Apache Hive 64-bit"));
        assert!(dsn.contains("Host=h"));
        assert!(dsn.contains("Port=10000"));
        assert!(dsn.contains("Schema=db"));
        assert!(dsn.contains("AuthMech=3"));
        assert!(dsn.contains("UseNativeQuery=1"));
        assert!(!dsn.contains("SSL"));
    }

    #[test]
    fn test_build_dsn_keeps_parameter_order() {
        let mut ssl = DsnParameters::new();
        ssl.insert("SSL", 1);
        ssl.insert("TrustedCerts", "/path/to/ca.pem");
        ssl.insert("AllowSelfSignedServerCert", 0);
        let mut transport = DsnParameters::new();
        transport.insert("HTTPPath", "/cliservice");

        let dsn = build_dsn("localhost", 10000, "default", &ssl, &transport);

        assert!(dsn.ends_with(
            ";SSL=1;TrustedCerts=/path/to/ca.pem;AllowSelfSignedServerCert=0;HTTPPath=/cliservice"
        ));
    }

    #[test]
    fn test_parameters_insert_replaces() {
        let mut params = DsnParameters::new();
        params.insert("SSL", 1);
        params.insert("SSL", 0);

        assert_eq!(params.len(), 1);
        assert_eq!(params.get("SSL"), Some("0"));
        assert_eq!(params.to_string(), "SSL=0");
    }

    #[test]
    fn test_with_credentials_escapes_password() {
        let dsn = with_credentials("Host=h", "admin", "p;a}ss");
        assert_eq!(dsn, "Host=h;UID={admin};PWD={p;a}}ss}");
    }

    #[test]
    fn test_with_credentials_quotes_user() {
        let dsn = with_credentials("Host=h", "dom;ain}user", "secret");
        assert_eq!(dsn, "Host=h;UID={dom;ain}}user};PWD={secret}");
    }
}
