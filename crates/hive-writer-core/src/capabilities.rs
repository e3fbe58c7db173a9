//! Server capability detection.
//!
//! Hive exposes neither its version nor its feature set through SQL, and both
//! change what the writer may emit:
//!
//! - MERGE exists since Hive 2.2.0 and is required for incremental upserts
//!   by primary key
//! - Hive 1.x mis-parses backslash escapes in string literals
//!
//! The version is read from the HiveServer2 JVM launch command. MERGE support
//! comes from a version table when the version is known, and otherwise from
//! probing the parser with an incomplete `MERGE` statement.

use crate::connection::HiveConnection;
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;
use tracing::{debug, info};

/// Query whose result embeds the JVM launch command line.
const VERSION_QUERY: &str = "set system:sun.java.command";

/// Incomplete statement used to probe the parser.
const MERGE_PROBE: &str = "MERGE";

/// Parser error fragment emitted when the MERGE keyword is recognized, e.g.
/// `mismatched input '<EOF>' expecting INTO near 'MERGE' in MERGE statement`.
/// Unsupported servers answer `cannot recognize input near 'MERGE' '<EOF>'`.
const MERGE_RECOGNIZED: &str = "near 'MERGE' in MERGE statemen";

/// First release with MERGE.
const MERGE_MIN_VERSION: HiveVersion = HiveVersion::new(2, 2, 0);

/// First release with backslash escapes in literals.
const ESCAPING_MIN_VERSION: HiveVersion = HiveVersion::new(2, 0, 0);

fn distribution_suffix_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)cdh[\-.*0-9]+").expect("valid regex"))
}

fn version_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)RunJar.+(\d{1,2}.\d{1,2}.\d{1,2})").expect("valid regex"))
}

/// Numeric `major.minor.patch` version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct HiveVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl HiveVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse the leading numeric components of a version string.
    pub fn parse(version: &str) -> Option<Self> {
        let mut parts = version
            .split(|c: char| !c.is_ascii_digit())
            .filter(|part| !part.is_empty())
            .map(|part| part.parse::<u32>());

        let major = parts.next()?.ok()?;
        let minor = parts.next()?.ok()?;
        let patch = parts.next()?.ok()?;
        Some(Self::new(major, minor, patch))
    }
}

impl fmt::Display for HiveVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// What the connected server supports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCapabilities {
    /// Detected version string
    pub version: Option<String>,
    /// MERGE statement available
    pub merge_supported: bool,
    /// String literals need quote doubling instead of backslash escapes
    pub legacy_escaping: bool,
}

impl Default for ServerCapabilities {
    fn default() -> Self {
        Self {
            version: None,
            merge_supported: false,
            legacy_escaping: false,
        }
    }
}

impl ServerCapabilities {
    /// Detect capabilities of a live connection.
    pub fn detect(connection: &impl HiveConnection) -> Self {
        let version = detect_version(connection);
        let parsed = version.as_deref().and_then(HiveVersion::parse);

        let merge_supported = match parsed {
            Some(v) => v >= MERGE_MIN_VERSION,
            None => is_merge_supported(connection),
        };
        let legacy_escaping = parsed.is_some_and(|v| v < ESCAPING_MIN_VERSION);

        let capabilities = Self {
            version,
            merge_supported,
            legacy_escaping,
        };
        info!(
            version = ?capabilities.version,
            merge_supported = capabilities.merge_supported,
            legacy_escaping = capabilities.legacy_escaping,
            "Detected Hive server capabilities"
        );
        capabilities
    }
}

/// Read the server version from the JVM launch command.
///
/// `None` when the query fails, returns nothing, or the command line has no
/// recognizable version.
pub fn detect_version(connection: &impl HiveConnection) -> Option<String> {
    let rows = match connection.query(VERSION_QUERY) {
        Ok(rows) => rows,
        Err(e) => {
            debug!(error = %e, "Version query failed");
            return None;
        }
    };

    let output = rows
        .into_iter()
        .next()
        .and_then(|row| row.into_iter().next())
        .flatten();
    version_from_command_output(output.as_deref())
}

/// Extract the version from `set system:sun.java.command` output.
///
/// Example inputs:
/// `system:sun.java.command=org.apache.hadoop.util.RunJar /opt/hive/lib/hive-service-2.3.6.jar org.apache.hive.service.server.HiveServer2`
/// `system:sun.java.command=org.apache.hadoop.util.RunJar /opt/cloudera/parcels/CDH-4.2.2-1.cdh4.2.2.p0.10/bin/../lib/hive/lib/hive-cli-0.10.0-cdh4.2.2.jar org.apache.hadoop.hive.cli.CliDriver`
pub fn version_from_command_output(output: Option<&str>) -> Option<String> {
    let output = output.filter(|o| !o.is_empty())?;

    // CDH packaging tags carry their own version numbers
    let cleaned = distribution_suffix_pattern().replace_all(output, "");

    version_pattern()
        .captures(&cleaned)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().to_string())
}

/// Probe MERGE support through the parser error message.
///
/// Any error other than the "recognized" phrasing counts as unsupported.
pub fn is_merge_supported(connection: &impl HiveConnection) -> bool {
    match connection.execute(MERGE_PROBE) {
        Ok(()) => true,
        Err(e) => merge_recognized(&e.message),
    }
}

/// Whether a MERGE probe error shows the keyword was recognized.
pub fn merge_recognized(error_message: &str) -> bool {
    error_message.contains(MERGE_RECOGNIZED)
}
