//! Application configuration loading for CLI defaults.
//!
//! ```toml
//! log_level = "info"
//!
//! [api]
//! endpoint = "https://api.crossref.org"
//! rows = 1000
//! mailto = "ops@example.org"
//! connect_timeout_secs = 30
//! read_timeout_secs = 300
//! max_connect_attempts = 10
//! host_spacing_ms = 0
//!
//! [cache]
//! dir = "/var/cache/harvester"
//!
//! [harvest]
//! output_dir = "/data/crossref"
//! granularity = "month"
//! filter = "deposit"
//! concurrency = 4
//!
//! [records]
//! key_field = "URL"
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;

/// TOML-backed file configuration. Every value is optional; CLI flags win.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Default log filter when neither `RUST_LOG` nor -v/-q is given.
    pub log_level: Option<String>,
    pub api: ApiConfig,
    pub cache: CacheConfig,
    pub harvest: HarvestConfig,
    pub records: RecordsConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApiConfig {
    pub endpoint: Option<String>,
    /// Items per page (1..=1000).
    pub rows: Option<u32>,
    /// Contact address for the polite pool.
    pub mailto: Option<String>,
    pub connect_timeout_secs: Option<u64>,
    pub read_timeout_secs: Option<u64>,
    /// Connection attempts per request, including the first (1..=10).
    pub max_connect_attempts: Option<u32>,
    /// Minimum delay between requests to one host.
    pub host_spacing_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarvestConfig {
    pub output_dir: Option<PathBuf>,
    pub granularity: Option<String>,
    pub filter: Option<String>,
    /// Chunks harvested at once (1..=32).
    pub concurrency: Option<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RecordsConfig {
    pub key_field: Option<String>,
}

impl FileConfig {
    /// Validates config values against runtime and CLI constraints.
    pub fn validate(&self) -> Result<()> {
        if let Some(rows) = self.api.rows
            && !(1..=1000).contains(&rows)
        {
            bail!("Invalid config value for `api.rows`: {rows}. Expected range: 1..=1000");
        }
        if let Some(attempts) = self.api.max_connect_attempts
            && !(1..=10).contains(&attempts)
        {
            bail!(
                "Invalid config value for `api.max_connect_attempts`: {attempts}. Expected range: 1..=10"
            );
        }
        if let Some(spacing) = self.api.host_spacing_ms
            && spacing > 60_000
        {
            bail!(
                "Invalid config value for `api.host_spacing_ms`: {spacing}. Expected range: 0..=60000"
            );
        }
        validate_timeout_secs("api.connect_timeout_secs", self.api.connect_timeout_secs)?;
        validate_timeout_secs("api.read_timeout_secs", self.api.read_timeout_secs)?;

        if let Some(concurrency) = self.harvest.concurrency
            && !(1..=32).contains(&concurrency)
        {
            bail!(
                "Invalid config value for `harvest.concurrency`: {concurrency}. Expected range: 1..=32"
            );
        }
        if let Some(granularity) = &self.harvest.granularity {
            granularity
                .parse::<harvester_core::Granularity>()
                .with_context(|| "Invalid config value for `harvest.granularity`")?;
        }
        if let Some(filter) = &self.harvest.filter {
            harvester_core::FilterKind::new(filter)
                .with_context(|| "Invalid config value for `harvest.filter`")?;
        }
        if let Some(level) = &self.log_level {
            tracing_subscriber::EnvFilter::try_new(level)
                .with_context(|| format!("Invalid config value for `log_level`: {level:?}"))?;
        }
        Ok(())
    }
}

fn validate_timeout_secs(field: &str, value: Option<u64>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(1..=3600).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: 1..=3600");
    }
    Ok(())
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/harvester/config.toml`
/// 2. `$HOME/.config/harvester/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("harvester")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("harvester")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads the config file.
///
/// An explicit path must exist. Without one, the default path is used if a
/// file is present there; otherwise all defaults apply.
pub fn load_config(explicit: Option<&Path>) -> Result<FileConfig> {
    if let Some(path) = explicit {
        return load_file_config(path);
    }
    match resolve_default_config_path() {
        Some(path) if path.is_file() => load_file_config(&path),
        _ => Ok(FileConfig::default()),
    }
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let cfg: FileConfig = toml::from_str(raw)?;
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_partial_fields() {
        let cfg = parse_config_str(
            r#"
            log_level = "debug"

            [api]
            rows = 200
            mailto = "ops@example.org"

            [harvest]
            granularity = "week"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.log_level.as_deref(), Some("debug"));
        assert_eq!(cfg.api.rows, Some(200));
        assert_eq!(cfg.api.mailto.as_deref(), Some("ops@example.org"));
        assert_eq!(cfg.harvest.granularity.as_deref(), Some("week"));
        assert!(cfg.cache.dir.is_none());
    }

    #[test]
    fn test_parse_empty_config_is_default() {
        assert_eq!(parse_config_str("").unwrap(), FileConfig::default());
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = parse_config_str("[api]\nrow = 5\n").unwrap_err();
        assert!(format!("{err:#}").contains("row"), "{err:#}");
    }

    #[test]
    fn test_rows_out_of_range_rejected() {
        let err = parse_config_str("[api]\nrows = 5000\n").unwrap_err();
        assert!(err.to_string().contains("api.rows"));
    }

    #[test]
    fn test_concurrency_out_of_range_rejected() {
        let err = parse_config_str("[harvest]\nconcurrency = 0\n").unwrap_err();
        assert!(err.to_string().contains("harvest.concurrency"));
    }

    #[test]
    fn test_timeout_out_of_range_rejected() {
        let err = parse_config_str("[api]\nread_timeout_secs = 0\n").unwrap_err();
        assert!(err.to_string().contains("api.read_timeout_secs"));
    }

    #[test]
    fn test_bad_granularity_rejected() {
        assert!(parse_config_str("[harvest]\ngranularity = \"hourly\"\n").is_err());
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let result = load_config(Some(&dir.path().join("absent.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_explicit_file_is_loaded() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[cache]\ndir = \"/tmp/c\"\n").unwrap();
        let cfg = load_config(Some(&path)).unwrap();
        assert_eq!(cfg.cache.dir, Some(PathBuf::from("/tmp/c")));
    }
}
