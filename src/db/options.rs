use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use super::metrics::RowMetrics;

/// Page size used when neither the caller nor a config file sets one.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Configuration supplied when opening a [`super::Db`].
#[derive(Clone)]
pub struct DbOptions {
    /// Rows requested per listing page.
    pub page_size: usize,
    /// Deadline applied to every store call.
    pub timeout: Option<Duration>,
    /// Optional metrics collection implementation.
    pub metrics: Option<Arc<dyn RowMetrics>>,
}

impl Default for DbOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            timeout: None,
            metrics: None,
        }
    }
}

impl fmt::Debug for DbOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbOptions")
            .field("page_size", &self.page_size)
            .field("timeout", &self.timeout)
            .field("metrics", &self.metrics.is_some())
            .finish()
    }
}

impl DbOptions {
    /// Sets the listing page size.
    pub fn page_size(mut self, rows: usize) -> Self {
        self.page_size = rows;
        self
    }

    /// Sets the per-call store timeout.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Installs a metrics sink.
    pub fn metrics(mut self, metrics: Arc<dyn RowMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Parses the `[client]` section of a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: None,
            source,
        })?;
        raw.into_options()
    }

    /// Loads options from `explicit`, or from [`default_config_path`].
    ///
    /// A missing file yields the defaults.
    pub fn load(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        let path = explicit.or_else(default_config_path);
        let raw = match path.as_ref() {
            Some(config_path) if config_path.exists() => read_file(config_path)?,
            _ => RawConfig::default(),
        };
        raw.into_options()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawConfig {
    client: RawClient,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawClient {
    page_size: Option<usize>,
    timeout_ms: Option<u64>,
}

impl RawConfig {
    fn into_options(self) -> Result<DbOptions, ConfigError> {
        let mut opts = DbOptions::default();
        if let Some(page_size) = self.client.page_size {
            if page_size == 0 {
                return Err(ConfigError::InvalidPageSize);
            }
            opts.page_size = page_size;
        }
        opts.timeout = self.client.timeout_ms.map(Duration::from_millis);
        Ok(opts)
    }
}

fn read_file(path: &Path) -> Result<RawConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: Some(path.to_path_buf()),
        source,
    })
}

/// Errors raised while loading [`DbOptions`] from TOML.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The document is not valid TOML or has unknown keys.
    #[error("failed to parse config{}: {source}", path.as_ref().map(|p| format!(" {}", p.display())).unwrap_or_default())]
    Parse {
        /// File that failed, when loaded from disk.
        path: Option<PathBuf>,
        /// Underlying parse error.
        source: toml::de::Error,
    },
    /// `client.page_size` was zero.
    #[error("client.page_size must be at least 1")]
    InvalidPageSize,
}

/// `$CONFIG_DIR/rowgraph/config.toml`, when the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("rowgraph").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn client_section_overrides_defaults() {
        let opts = DbOptions::from_toml_str("[client]\npage_size = 50\ntimeout_ms = 2500\n").unwrap();
        assert_eq!(opts.page_size, 50);
        assert_eq!(opts.timeout, Some(Duration::from_millis(2500)));
    }

    #[test]
    fn empty_document_keeps_defaults() {
        let opts = DbOptions::from_toml_str("").unwrap();
        assert_eq!(opts.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(opts.timeout, None);
    }

    #[test]
    fn zero_page_size_and_unknown_keys_are_rejected() {
        assert!(matches!(
            DbOptions::from_toml_str("[client]\npage_size = 0\n"),
            Err(ConfigError::InvalidPageSize)
        ));
        assert!(matches!(
            DbOptions::from_toml_str("[client]\npage = 3\n"),
            Err(ConfigError::Parse { path: None, .. })
        ));
    }

    #[test]
    fn load_reads_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[client]\npage_size = 7").unwrap();
        let opts = DbOptions::load(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(opts.page_size, 7);
    }

    #[test]
    fn load_of_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let opts = DbOptions::load(Some(dir.path().join("absent.toml"))).unwrap();
        assert_eq!(opts.page_size, DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn load_reports_parse_errors_with_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[client\n").unwrap();
        let err = DbOptions::load(Some(file.path().to_path_buf())).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { path: Some(_), .. }));
    }
}
