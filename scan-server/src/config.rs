//! Process-wide configuration: environment variables override a `scan.toml`
//! file, which overrides built-in defaults. Mirrors the precedence the
//! source system's own config loader uses, simplified to this service's
//! recognized keys (§6 of the component design).

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub server_host: String,
    pub server_port: u16,
    pub database_url: Option<String>,

    pub use_scan_queue: bool,
    pub scan_handler_active_time_secs: u64,
    pub max_active_scan_handlers: usize,
    pub max_concurrent_scan_updates: usize,
    pub scanner_connection_retry: u32,
    pub table_order_if_sort_not_specified: bool,

    pub supervisor_tick_interval_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            server_host: "0.0.0.0".to_string(),
            server_port: 3080,
            database_url: None,
            use_scan_queue: true,
            scan_handler_active_time_secs: 0,
            max_active_scan_handlers: 0,
            max_concurrent_scan_updates: 0,
            scanner_connection_retry: 3,
            table_order_if_sort_not_specified: false,
            supervisor_tick_interval_secs: 5,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    server_host: Option<String>,
    server_port: Option<u16>,
    database_url: Option<String>,
    use_scan_queue: Option<bool>,
    scan_handler_active_time_secs: Option<u64>,
    max_active_scan_handlers: Option<usize>,
    max_concurrent_scan_updates: Option<usize>,
    scanner_connection_retry: Option<u32>,
    table_order_if_sort_not_specified: Option<bool>,
    supervisor_tick_interval_secs: Option<u64>,
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
}

/// Composes a [`ServiceConfig`] from (in increasing precedence) built-in
/// defaults, an optional `scan.toml`, and environment variables.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    pub fn load(&self) -> Result<ServiceConfig, ConfigLoadError> {
        match &self.options.env_file {
            Some(path) => {
                let _ = dotenvy::from_path(path);
            }
            None => {
                let _ = dotenvy::dotenv();
            }
        }

        let file = self.load_file()?.unwrap_or_default();
        let defaults = ServiceConfig::default();

        Ok(ServiceConfig {
            server_host: env_string("SCAN_SERVER_HOST")
                .or(file.server_host)
                .unwrap_or(defaults.server_host),
            server_port: env_parsed("SCAN_SERVER_PORT")
                .or(file.server_port)
                .unwrap_or(defaults.server_port),
            database_url: env_string("DATABASE_URL").or(file.database_url),
            use_scan_queue: env_bool("USE_SCAN_QUEUE")
                .or(file.use_scan_queue)
                .unwrap_or(defaults.use_scan_queue),
            scan_handler_active_time_secs: env_parsed("SCAN_HANDLER_ACTIVE_TIME")
                .or(file.scan_handler_active_time_secs)
                .unwrap_or(defaults.scan_handler_active_time_secs),
            max_active_scan_handlers: env_parsed("MAX_ACTIVE_SCAN_HANDLERS")
                .or(file.max_active_scan_handlers)
                .unwrap_or(defaults.max_active_scan_handlers),
            max_concurrent_scan_updates: env_parsed("MAX_CONCURRENT_SCAN_UPDATES")
                .or(file.max_concurrent_scan_updates)
                .unwrap_or(defaults.max_concurrent_scan_updates),
            scanner_connection_retry: env_parsed("SCANNER_CONNECTION_RETRY")
                .or(file.scanner_connection_retry)
                .unwrap_or(defaults.scanner_connection_retry),
            table_order_if_sort_not_specified: env_bool("TABLE_ORDER_IF_SORT_NOT_SPECIFIED")
                .or(file.table_order_if_sort_not_specified)
                .unwrap_or(defaults.table_order_if_sort_not_specified),
            supervisor_tick_interval_secs: env_parsed("SUPERVISOR_TICK_INTERVAL_SECS")
                .or(file.supervisor_tick_interval_secs)
                .unwrap_or(defaults.supervisor_tick_interval_secs),
        })
    }

    fn load_file(&self) -> Result<Option<FileConfig>, ConfigLoadError> {
        let path = self
            .options
            .config_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("scan.toml"));
        self.load_file_at(&path)
    }

    fn load_file_at(&self, path: &Path) -> Result<Option<FileConfig>, ConfigLoadError> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let parsed = toml::from_str(&contents).map_err(|source| ConfigLoadError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Some(parsed))
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_nothing_else_is_set() {
        let loader = ConfigLoader::with_options(ConfigLoaderOptions {
            config_path: Some(PathBuf::from("/nonexistent/scan.toml")),
            env_file: Some(PathBuf::from("/nonexistent/.env")),
        });
        let config = loader.load().unwrap();
        assert_eq!(config.server_port, 3080);
        assert!(config.use_scan_queue);
        assert_eq!(config.max_active_scan_handlers, 0);
    }

    #[test]
    fn file_values_are_picked_up_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.toml");
        std::fs::write(&path, "max_active_scan_handlers = 7\nuse_scan_queue = false\n").unwrap();

        let loader = ConfigLoader::with_options(ConfigLoaderOptions {
            config_path: Some(path),
            env_file: Some(PathBuf::from("/nonexistent/.env")),
        });
        let config = loader.load().unwrap();
        assert_eq!(config.max_active_scan_handlers, 7);
        assert!(!config.use_scan_queue);
    }
}
