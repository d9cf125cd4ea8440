//! Configuration loading and resolution
//!
//! Settings resolve in priority order:
//! 1. Command-line argument (highest priority; clap also maps the
//!    `REVIEWS_*` variables onto these)
//! 2. Environment variable (ClickHouse connection settings)
//! 3. TOML config file
//! 4. Built-in default (fallback)

use crate::schema::DEFAULT_BATCH_SIZE;
use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "REVIEWS_CONFIG";

const APP_DIR: &str = "reviews-ingest";
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_CLICKHOUSE_URL: &str = "http://localhost:8123";
const DEFAULT_CLICKHOUSE_USER: &str = "default";
const DEFAULT_CLICKHOUSE_DATABASE: &str = "default";

/// Store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Sqlite,
    Clickhouse,
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Backend::Sqlite),
            "clickhouse" => Ok(Backend::Clickhouse),
            other => Err(format!(
                "unknown backend '{}' (expected 'sqlite' or 'clickhouse')",
                other
            )),
        }
    }
}

/// What the loader does with a line that cannot be parsed or normalized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedPolicy {
    /// Stop the run at the first malformed line
    #[default]
    Abort,
    /// Log the line number, count it and continue
    Skip,
}

impl FromStr for MalformedPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abort" => Ok(MalformedPolicy::Abort),
            "skip" => Ok(MalformedPolicy::Skip),
            other => Err(format!(
                "unknown malformed-record policy '{}' (expected 'abort' or 'skip')",
                other
            )),
        }
    }
}

/// Bootstrap configuration loaded from TOML file
///
/// Every key is optional; anything missing falls through to the built-in
/// defaults during [`Settings::resolve`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TomlConfig {
    #[serde(default)]
    pub backend: Option<Backend>,

    /// Records per flush
    #[serde(default)]
    pub batch_size: Option<usize>,

    /// Retries per store call before a batch is given up
    #[serde(default)]
    pub max_retries: Option<u32>,

    #[serde(default)]
    pub on_malformed: Option<MalformedPolicy>,

    #[serde(default)]
    pub sqlite: SqliteSection,

    #[serde(default)]
    pub clickhouse: ClickHouseSection,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// `[sqlite]` table
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SqliteSection {
    /// Database file path
    pub path: Option<PathBuf>,
}

/// `[clickhouse]` table
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClickHouseSection {
    /// HTTP interface URL, e.g. `http://localhost:8123`
    pub url: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TomlConfig {
    /// Parse TOML text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Read and parse a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Read config file {} failed: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }
}

/// Locate and load the TOML config
///
/// An explicit path (CLI or `REVIEWS_CONFIG`) must exist. Otherwise the
/// per-user default location is tried, and a missing file means "all defaults".
pub fn load_toml_config(explicit: Option<&Path>) -> Result<TomlConfig> {
    if let Some(path) = explicit {
        return TomlConfig::load(path);
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        return TomlConfig::load(Path::new(&path));
    }

    match default_config_path() {
        Some(path) if path.exists() => TomlConfig::load(&path),
        _ => Ok(TomlConfig::default()),
    }
}

/// Default config file path for the platform
///
/// `~/.config/reviews-ingest/config.toml` on Linux
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR).join("config.toml"))
}

/// Default SQLite database path for the platform
///
/// `~/.local/share/reviews-ingest/reviews.db` on Linux
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from("./reviews_data"))
        .join("reviews.db")
}

/// Values supplied on the command line
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub backend: Option<Backend>,
    pub database: Option<PathBuf>,
    pub batch_size: Option<usize>,
    pub max_retries: Option<u32>,
    pub on_malformed: Option<MalformedPolicy>,
    pub log_level: Option<String>,
}

/// Resolved ClickHouse connection settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickHouseSettings {
    pub url: String,
    pub user: String,
    pub password: String,
    pub database: String,
}

/// Fully resolved runtime settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub backend: Backend,
    pub batch_size: usize,
    pub max_retries: u32,
    pub on_malformed: MalformedPolicy,
    pub sqlite_path: PathBuf,
    pub clickhouse: ClickHouseSettings,
    pub log_level: String,
}

impl Settings {
    /// Merge CLI overrides, environment and TOML over the built-in defaults
    pub fn resolve(overrides: &Overrides, toml: &TomlConfig) -> Result<Self> {
        let batch_size = overrides
            .batch_size
            .or(toml.batch_size)
            .unwrap_or(DEFAULT_BATCH_SIZE);
        if batch_size == 0 {
            return Err(Error::Config("batch_size must be at least 1".to_string()));
        }

        let clickhouse = ClickHouseSettings {
            url: env_or("REVIEWS_CLICKHOUSE_URL", toml.clickhouse.url.as_deref())
                .unwrap_or_else(|| DEFAULT_CLICKHOUSE_URL.to_string()),
            user: env_or("REVIEWS_CLICKHOUSE_USER", toml.clickhouse.user.as_deref())
                .unwrap_or_else(|| DEFAULT_CLICKHOUSE_USER.to_string()),
            password: env_or(
                "REVIEWS_CLICKHOUSE_PASSWORD",
                toml.clickhouse.password.as_deref(),
            )
            .unwrap_or_default(),
            database: env_or(
                "REVIEWS_CLICKHOUSE_DATABASE",
                toml.clickhouse.database.as_deref(),
            )
            .unwrap_or_else(|| DEFAULT_CLICKHOUSE_DATABASE.to_string()),
        };

        Ok(Self {
            backend: overrides.backend.or(toml.backend).unwrap_or_default(),
            batch_size,
            max_retries: overrides
                .max_retries
                .or(toml.max_retries)
                .unwrap_or(DEFAULT_MAX_RETRIES),
            on_malformed: overrides
                .on_malformed
                .or(toml.on_malformed)
                .unwrap_or_default(),
            sqlite_path: overrides
                .database
                .clone()
                .or_else(|| toml.sqlite.path.clone())
                .unwrap_or_else(default_database_path),
            clickhouse,
            log_level: overrides
                .log_level
                .clone()
                .unwrap_or_else(|| toml.logging.level.clone()),
        })
    }
}

/// Environment variable if set and non-blank, else the TOML value
fn env_or(var: &str, toml_value: Option<&str>) -> Option<String> {
    std::env::var(var)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .or_else(|| toml_value.map(str::to_string))
}
