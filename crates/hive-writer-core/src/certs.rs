//! CA certificate handling for TLS connections.
//!
//! The Hive ODBC driver reads trusted CA certificates from a PEM file named by
//! the `TrustedCerts` connection parameter. [`CertManager`] turns the `ssl`
//! configuration block into those parameters:
//!
//! - PEM certificates are written to the bundle as-is
//! - JKS keystores arrive base64-encoded and are converted to PEM with `keytool`
//! - `internal:<filename>` references are read from the bundled files directory
//!
//! The bundle lives in a temporary directory owned by the manager and is
//! removed when the manager is dropped.

use crate::config::{CaFileType, SslConfig};
use crate::dsn::DsnParameters;
use crate::error::CertificateError;
use crate::Result;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use regex::Regex;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::OnceLock;
use tempfile::TempDir;
use tracing::{debug, info};

const INTERNAL_PREFIX: &str = "internal:";
const PEM_BUNDLE_NAME: &str = "ca-bundle.pem";
const JKS_BUNDLE_NAME: &str = "ca-bundle.jks";
const BEGIN_CERTIFICATE: &str = "-----BEGIN CERTIFICATE-----";
const END_CERTIFICATE: &str = "-----END CERTIFICATE-----";

fn internal_file_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-zA-Z0-9.\-_+]+$").expect("valid regex"))
}

/// Translates an SSL configuration into connection-string parameters.
pub struct CertManager {
    /// TLS configuration, `None` when the `ssl` block is absent
    ssl: Option<SslConfig>,
    /// Directory holding certificates referenced as `internal:<filename>`
    bundled_files_dir: Option<PathBuf>,
    /// keytool executable used for JKS conversion
    keytool: PathBuf,
    /// Parent of the scratch directory, the system temp dir when unset
    temp_root: Option<PathBuf>,
    /// Scratch directory; dropping it deletes the bundle
    temp_dir: Option<TempDir>,
    /// Memoized bundle location
    bundle_path: Option<PathBuf>,
}

impl CertManager {
    /// Create a manager for the given `ssl` block.
    pub fn new(ssl: Option<SslConfig>, bundled_files_dir: Option<PathBuf>) -> Self {
        Self {
            ssl,
            bundled_files_dir,
            keytool: PathBuf::from("keytool"),
            temp_root: None,
            temp_dir: None,
            bundle_path: None,
        }
    }

    /// Use a specific keytool executable.
    pub fn with_keytool(mut self, keytool: impl Into<PathBuf>) -> Self {
        self.keytool = keytool.into();
        self
    }

    /// Create the bundle directory under `root` instead of the system temp dir.
    pub fn with_temp_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.temp_root = Some(root.into());
        self
    }

    /// Connection-string parameters for the configured TLS mode.
    ///
    /// Empty when TLS is absent or disabled.
    pub fn dsn_parameters(&mut self) -> Result<DsnParameters> {
        let mut parameters = DsnParameters::new();

        let (verify_server_cert, ignore_certificate_cn) = match &self.ssl {
            Some(ssl) if ssl.enabled => (ssl.verify_server_cert, ssl.ignore_certificate_cn),
            _ => return Ok(parameters),
        };

        parameters.insert("SSL", 1);
        parameters.insert(
            "AllowSelfSignedServerCert",
            if verify_server_cert { 0 } else { 1 },
        );
        parameters.insert(
            "CAIssuedCertNamesMismatch",
            if ignore_certificate_cn { 1 } else { 0 },
        );

        if let Some(path) = self.ca_bundle_path()? {
            parameters.insert("TrustedCerts", path.display());
        }

        Ok(parameters)
    }

    /// Path of the PEM bundle, creating it on first call.
    ///
    /// `None` when no CA is configured.
    pub fn ca_bundle_path(&mut self) -> Result<Option<&Path>> {
        if self.bundle_path.is_none() {
            self.bundle_path = self.generate_ca_bundle()?;
        }
        Ok(self.bundle_path.as_deref())
    }

    fn generate_ca_bundle(&mut self) -> Result<Option<PathBuf>> {
        let ssl = match &self.ssl {
            Some(ssl) => ssl,
            None => return Ok(None),
        };

        // Resolve and decode before touching the filesystem
        let ca = match resolve_ca(ssl, self.bundled_files_dir.as_deref())? {
            Some(ca) => ca,
            None => return Ok(None),
        };
        let ca_file_type = ssl.ca_file_type;

        let temp_dir = match self.temp_dir.take() {
            Some(dir) => dir,
            None => {
                let root = self.temp_root.clone().unwrap_or_else(std::env::temp_dir);
                TempDir::new_in(&root)
                    .map_err(|source| CertificateError::Materialize { path: root, source })?
            }
        };
        let dir = temp_dir.path().to_path_buf();
        self.temp_dir = Some(temp_dir);

        let pem_path = dir.join(PEM_BUNDLE_NAME);
        match ca_file_type {
            CaFileType::Pem => {
                write_bundle(&pem_path, &ca)?;
            }
            CaFileType::Jks => {
                let jks_path = dir.join(JKS_BUNDLE_NAME);
                write_bundle(&jks_path, &ca)?;
                let pem = convert_jks_to_pem(&self.keytool, &jks_path)?;
                write_bundle(&pem_path, pem.as_bytes())?;
            }
        }

        info!(path = %pem_path.display(), file_type = ?ca_file_type, "CA bundle created");
        Ok(Some(pem_path))
    }
}

fn write_bundle(path: &Path, content: &[u8]) -> Result<()> {
    std::fs::write(path, content).map_err(|source| {
        CertificateError::Materialize {
            path: path.to_path_buf(),
            source,
        }
        .into()
    })
}

/// Resolve the configured CA into raw certificate bytes.
///
/// Returns `None` when no CA is configured. `internal:` references are read
/// from `bundled_files_dir` without further decoding; other JKS values are
/// base64-decoded.
pub fn resolve_ca(ssl: &SslConfig, bundled_files_dir: Option<&Path>) -> Result<Option<Vec<u8>>> {
    let ca = match ssl.ca.as_deref() {
        Some(ca) if !ca.is_empty() => ca,
        _ => return Ok(None),
    };

    if let Some(file_name) = ca.strip_prefix(INTERNAL_PREFIX) {
        if !internal_file_name_pattern().is_match(file_name) {
            return Err(CertificateError::InvalidFileName(file_name.to_string()).into());
        }

        let dir = bundled_files_dir.ok_or_else(|| {
            CertificateError::BundledFilesNotConfigured(file_name.to_string())
        })?;
        let path = dir.join(file_name);
        let content = match std::fs::read(&path) {
            Ok(content) if !content.is_empty() => content,
            Ok(_) => return Err(CertificateError::NotFound(path).into()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CertificateError::NotFound(path).into())
            }
            Err(source) => return Err(CertificateError::Unreadable { path, source }.into()),
        };

        debug!(file = %file_name, "Loaded internal CA certificate");
        return Ok(Some(content));
    }

    match ssl.ca_file_type {
        CaFileType::Pem => Ok(Some(ca.as_bytes().to_vec())),
        CaFileType::Jks => {
            let compact: String = ca.split_whitespace().collect();
            let decoded =
                STANDARD
                    .decode(compact)
                    .map_err(|e| CertificateError::Base64Decode {
                        parameter: "db.ssl.ca".to_string(),
                        message: e.to_string(),
                    })?;
            Ok(Some(decoded))
        }
    }
}

/// Export the certificates of a JKS keystore as PEM.
fn convert_jks_to_pem(keytool: &Path, jks_path: &Path) -> Result<String> {
    let mut child = Command::new(keytool)
        .arg("-list")
        .arg("-storetype")
        .arg("JKS")
        .arg("-keystore")
        .arg(jks_path)
        .arg("-rfc")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| CertificateError::Conversion {
            output: format!("cannot run {}: {}", keytool.display(), e),
        })?;

    // keytool prompts for the store password; an empty answer lists public certificates
    if let Some(mut stdin) = child.stdin.take() {
        let _ = stdin.write_all(b"\n");
    }

    let output = child
        .wait_with_output()
        .map_err(|e| CertificateError::Conversion {
            output: format!("{} did not finish: {}", keytool.display(), e),
        })?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    if !output.status.success() {
        return Err(CertificateError::Conversion {
            output: format!("{} {}", stdout.trim(), stderr.trim()),
        }
        .into());
    }

    let pem = extract_pem_certificates(&stdout);
    if pem.is_empty() {
        return Err(CertificateError::Conversion {
            output: "no certificates found in keystore".to_string(),
        }
        .into());
    }

    Ok(pem)
}

/// Keep only the `BEGIN CERTIFICATE` .. `END CERTIFICATE` blocks of `text`.
pub fn extract_pem_certificates(text: &str) -> String {
    let mut pem = String::new();
    let mut inside = false;

    for line in text.lines() {
        if line.contains(BEGIN_CERTIFICATE) {
            inside = true;
        }
        if inside {
            pem.push_str(line);
            pem.push('\n');
        }
        if line.contains(END_CERTIFICATE) {
            inside = false;
        }
    }

    pem
}
