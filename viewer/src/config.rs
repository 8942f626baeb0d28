use anyhow::{Context, Result};
use common::{Column, SortDir, SortSpec};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_url")]
    pub url: String,
    #[serde(default = "default_list_path")]
    pub list_path: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_server_url() -> String { common::DEFAULT_SERVER_URL.to_string() }
fn default_list_path() -> String { common::LIST_JOBS_PATH.to_string() }
fn default_timeout() -> u64 { 30 }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: default_server_url(),
            list_path: default_list_path(),
            timeout_secs: default_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Full WebSocket URL. Derived from `server.url` when unset.
    pub url: Option<String>,
    #[serde(default = "default_engine_io_version")]
    pub engine_io_version: u8,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub event_prefix: String,
    #[serde(default = "default_max_reconnect_delay")]
    pub max_reconnect_delay_secs: u64,
}

fn default_true() -> bool { true }
fn default_engine_io_version() -> u8 { 4 }
fn default_namespace() -> String { "/".to_string() }
fn default_max_reconnect_delay() -> u64 { 30 }

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: None,
            engine_io_version: default_engine_io_version(),
            namespace: default_namespace(),
            event_prefix: String::new(),
            max_reconnect_delay_secs: default_max_reconnect_delay(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableConfig {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_sort_column")]
    pub sort_column: Column,
    #[serde(default)]
    pub sort_dir: SortDir,
}

fn default_page_size() -> usize { common::DEFAULT_PAGE_SIZE }
fn default_sort_column() -> Column { Column::Id }

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            sort_column: default_sort_column(),
            sort_dir: SortDir::Desc,
        }
    }
}

impl TableConfig {
    pub fn sort_spec(&self) -> SortSpec {
        SortSpec { column: self.sort_column, dir: self.sort_dir }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    pub output: Option<PathBuf>,
}

fn default_log_level() -> String { "info".to_string() }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            output: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub realtime: RealtimeConfig,
    #[serde(default)]
    pub table: TableConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        Ok(config)
    }

    /// Detect file type by extension and load
    pub fn from_file(path: &Path) -> Result<Self> {
        let ext = path.extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");

        match ext {
            "yaml" | "yml" => Self::from_yaml_file(path),
            "toml" => Self::from_toml_file(path),
            _ => Err(anyhow::anyhow!("Unsupported config file format. Use .yaml, .yml, or .toml")),
        }
    }

    /// Load the explicit path if given, otherwise the first default location
    /// that exists, otherwise built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        for candidate in [expand_home(common::USER_CONFIG_PATH), PathBuf::from(common::LOCAL_CONFIG_PATH)] {
            if candidate.exists() {
                return Self::from_file(&candidate);
            }
        }
        Ok(Config::default())
    }

    pub fn validate(&self) -> Result<()> {
        self.server_url()?;
        if self.table.page_size == 0 {
            anyhow::bail!("table.page_size must be at least 1");
        }
        if !matches!(self.realtime.engine_io_version, 3 | 4) {
            anyhow::bail!(
                "realtime.engine_io_version must be 3 or 4, got {}",
                self.realtime.engine_io_version
            );
        }
        if !self.realtime.namespace.starts_with('/') {
            anyhow::bail!("realtime.namespace must start with '/'");
        }
        Ok(())
    }

    /// Server base URL with a trailing slash so relative paths join under it.
    pub fn server_url(&self) -> Result<Url> {
        let mut raw = self.server.url.clone();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        Url::parse(&raw).with_context(|| format!("Invalid server url: {}", self.server.url))
    }

    /// WebSocket URL of the Socket.IO endpoint on the server's host and port.
    pub fn realtime_url(&self) -> Result<Url> {
        if let Some(url) = &self.realtime.url {
            return Url::parse(url).with_context(|| format!("Invalid realtime url: {}", url));
        }

        let server = self.server_url()?;
        let scheme = match server.scheme() {
            "https" => "wss",
            _ => "ws",
        };
        let host = server
            .host_str()
            .ok_or_else(|| anyhow::anyhow!("Server url has no host: {}", server))?;
        let authority = match server.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        let url = format!(
            "{}://{}{}?EIO={}&transport=websocket",
            scheme, authority, common::SOCKET_IO_PATH, self.realtime.engine_io_version
        );
        Url::parse(&url).with_context(|| format!("Invalid realtime url: {}", url))
    }
}

fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => PathBuf::from(home).join(rest),
        _ => PathBuf::from(path),
    }
}
