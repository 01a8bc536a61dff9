//! Connection configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values (`api.vndb.org:19535`, TLS on)
//! 2. YAML config file (if specified via `VNDB_CONFIG`)
//! 3. Environment variables

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use vndb_protocol::{LoginRequest, DEFAULT_HOST, DEFAULT_PORT};

/// Default read buffer size (8 KiB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8 * 1024;

/// Minimum read buffer size (1 KiB).
pub const MIN_READ_BUFFER_SIZE: usize = 1024;

/// Maximum read buffer size (1 MiB).
pub const MAX_READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {1}", .0.display())]
    Io(PathBuf, std::io::Error),

    #[error("failed to parse config file '{}': {1}", .0.display())]
    Parse(PathBuf, String),
}

/// TLS settings for the connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    /// Encrypt the connection. The public API only accepts TLS.
    pub enabled: bool,
    /// PEM-encoded CA certificate(s); webpki roots when unset.
    pub ca_cert_path: Option<PathBuf>,
    /// Skip server certificate verification (INSECURE - development only).
    pub insecure: bool,
    /// Server name for SNI (defaults to the host).
    pub server_name: Option<String>,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ca_cert_path: None,
            insecure: false,
            server_name: None,
        }
    }
}

impl TlsConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(enabled) = std::env::var("VNDB_TLS") {
            self.enabled = parse_bool(&enabled);
        }
        if let Ok(path) = std::env::var("VNDB_CA_CERT") {
            self.ca_cert_path = Some(PathBuf::from(path));
        }
        if let Ok(insecure) = std::env::var("VNDB_TLS_INSECURE") {
            self.insecure = parse_bool(&insecure);
        }
        if let Ok(name) = std::env::var("VNDB_TLS_SERVER_NAME") {
            self.server_name = Some(name);
        }
    }
}

/// Connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    /// TCP connect + TLS handshake timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Read buffer size for socket reads.
    pub read_buffer_size: usize,
    pub tls: TlsConfig,
    /// Sent as `login` right after connecting, when set.
    pub login: Option<LoginRequest>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_PORT)
    }
}

impl ConnectionConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout_secs: 10,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            tls: TlsConfig::default(),
            login: None,
        }
    }

    /// Loads configuration from `VNDB_CONFIG` (if set), then applies env overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("VNDB_CONFIG") {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let mut config: ConnectionConfig = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e.to_string()))?;
        config.read_buffer_size = clamp_buffer(config.read_buffer_size);
        Ok(config)
    }

    /// Loads configuration from environment variables only.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("VNDB_HOST") {
            self.host = host;
        }
        if let Ok(port) = std::env::var("VNDB_PORT") {
            if let Ok(parsed) = port.parse() {
                self.port = parsed;
            }
        }
        if let Ok(timeout) = std::env::var("VNDB_CONNECT_TIMEOUT") {
            if let Ok(secs) = timeout.parse() {
                self.connect_timeout_secs = secs;
            }
        }
        if let Ok(size) = std::env::var("VNDB_READ_BUFFER_SIZE") {
            if let Ok(bytes) = size.parse() {
                self.read_buffer_size = clamp_buffer(bytes);
            }
        }
        self.tls.apply_env_overrides();

        if let Ok(client) = std::env::var("VNDB_CLIENT") {
            let clientver = std::env::var("VNDB_CLIENTVER").unwrap_or_else(|_| "0.0.0".into());
            self.login = Some(LoginRequest::new(client, clientver));
        }
        if let (Some(login), Ok(username), Ok(password)) = (
            self.login.as_mut(),
            std::env::var("VNDB_USERNAME"),
            std::env::var("VNDB_PASSWORD"),
        ) {
            login.username = Some(username);
            login.password = Some(password);
        }
    }

    /// Returns the `host:port` address.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_secs = timeout.as_secs();
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = clamp_buffer(size);
        self
    }

    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = tls;
        self
    }

    /// Disables TLS (local test servers only).
    pub fn with_plaintext(mut self) -> Self {
        self.tls.enabled = false;
        self
    }

    pub fn with_login(mut self, login: LoginRequest) -> Self {
        self.login = Some(login);
        self
    }

    /// Sets an anonymous login for the given client name and version.
    pub fn with_client(self, client: impl Into<String>, clientver: impl Into<String>) -> Self {
        self.with_login(LoginRequest::new(client, clientver))
    }
}

fn clamp_buffer(size: usize) -> usize {
    size.clamp(MIN_READ_BUFFER_SIZE, MAX_READ_BUFFER_SIZE)
}

fn parse_bool(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}
