// ABOUTME: Copy configuration as read from TOML files and command-line flags
// ABOUTME: Validates table names before any client is built

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;

use crate::error::{CopyError, Result, Side};
use crate::plan::Transform;

static TABLE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.-]{3,255}$").expect("table name pattern is valid"));

/// Where and how to reach one DynamoDB endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
    pub profile: Option<String>,
}

impl ClientConfig {
    /// Fields set on `self` win over the ones in `fallback`.
    pub fn or(&self, fallback: &ClientConfig) -> ClientConfig {
        ClientConfig {
            region: self.region.clone().or_else(|| fallback.region.clone()),
            endpoint_url: self
                .endpoint_url
                .clone()
                .or_else(|| fallback.endpoint_url.clone()),
            profile: self.profile.clone().or_else(|| fallback.profile.clone()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TableConfig {
    pub table_name: String,
    pub client: Option<ClientConfig>,
}

impl TableConfig {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            client: None,
        }
    }

    pub fn client_config(&self, default: &ClientConfig) -> ClientConfig {
        match &self.client {
            Some(client) => client.or(default),
            None => default.clone(),
        }
    }
}

/// What to do about point-in-time recovery on a freshly created destination.
///
/// In files this is written as `"copy"`, `true` or `false`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawBackupPolicy")]
pub enum BackupPolicy {
    /// Enable on the destination when the source has it enabled.
    #[default]
    Copy,
    AlwaysEnable,
    Never,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawBackupPolicy {
    Flag(bool),
    Name(String),
}

impl TryFrom<RawBackupPolicy> for BackupPolicy {
    type Error = String;

    fn try_from(raw: RawBackupPolicy) -> std::result::Result<Self, Self::Error> {
        match raw {
            RawBackupPolicy::Flag(true) => Ok(BackupPolicy::AlwaysEnable),
            RawBackupPolicy::Flag(false) => Ok(BackupPolicy::Never),
            RawBackupPolicy::Name(name) => name.parse(),
        }
    }
}

impl FromStr for BackupPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "copy" => Ok(BackupPolicy::Copy),
            "true" | "always" => Ok(BackupPolicy::AlwaysEnable),
            "false" | "never" => Ok(BackupPolicy::Never),
            other => Err(format!(
                "invalid continuous backups mode '{}', expected copy, true or false",
                other
            )),
        }
    }
}

impl fmt::Display for BackupPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackupPolicy::Copy => f.write_str("copy"),
            BackupPolicy::AlwaysEnable => f.write_str("true"),
            BackupPolicy::Never => f.write_str("false"),
        }
    }
}

/// Bounds for the loops that otherwise retry forever. `None` means unbounded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryLimits {
    pub max_write_retries: Option<u32>,
    pub activation_timeout_secs: Option<u64>,
}

impl RetryLimits {
    pub fn activation_timeout(&self) -> Option<Duration> {
        self.activation_timeout_secs.map(Duration::from_secs)
    }
}

/// Restart a copy after a known key with the counter already advanced.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResumeConfig {
    /// Exclusive start key in DynamoDB JSON, e.g. `{"id": {"S": "a-17"}}`.
    pub cursor: serde_json::Value,
    #[serde(default)]
    pub copied: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CopyConfig {
    pub default_client: ClientConfig,
    pub source: TableConfig,
    pub destination: TableConfig,
    pub log: bool,
    pub create_if_missing: bool,
    pub schema_only: bool,
    pub continuous_backups: BackupPolicy,
    pub retry: RetryLimits,
    pub resume: Option<ResumeConfig>,
    #[serde(skip)]
    pub transform: Transform,
}

impl CopyConfig {
    pub fn new(source_table: impl Into<String>, destination_table: impl Into<String>) -> Self {
        Self {
            source: TableConfig::new(source_table),
            destination: TableConfig::new(destination_table),
            ..Default::default()
        }
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| CopyError::configuration("config", e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            CopyError::configuration("config", format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn table(&self, side: Side) -> &TableConfig {
        match side {
            Side::Source => &self.source,
            Side::Destination => &self.destination,
        }
    }

    /// Checks both table names; the source is reported first.
    pub fn validate(&self) -> Result<()> {
        for side in [Side::Source, Side::Destination] {
            validate_table_name(side, &self.table(side).table_name)?;
        }
        Ok(())
    }
}

pub fn validate_table_name(side: Side, name: &str) -> Result<()> {
    if TABLE_NAME.is_match(name) {
        return Ok(());
    }
    Err(CopyError::configuration(
        format!("{}.table_name", side),
        "must follow AWS naming rules (3-255 length, and only the following characters: a-z, A-Z, 0-9, _-.)",
    ))
}
