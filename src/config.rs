//! # Configuration Management
//!
//! Centralized configuration for RPC clients and servers.
//!
//! Compression and serialization are chosen here, at construction time. The
//! server never picks a compression tag of its own: it answers every request
//! with the tag that request arrived with.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()` / `from_toml()`
//! - Direct instantiation with defaults and builder-style overrides
//! - Environment variables via `from_env()`
//!
//! ## Example
//! ```rust
//! use tinyrpc::config::ClientConfig;
//! use tinyrpc::core::serialization::Serializer;
//! use tinyrpc::utils::compression::CompressionType;
//!
//! let config = ClientConfig::default()
//!     .with_compression(CompressionType::SNAPPY)
//!     .with_serializer(Serializer::Json);
//! assert!(config.validate().is_empty());
//! ```

use crate::core::serialization::Serializer;
use crate::error::{ProtocolError, Result};
use crate::utils::compression::{CompressionType, CompressorRegistry};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Max allowed frame payload size (16 MB)
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Default per-call deadline imposed by the client facade
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default deadline for establishing a TCP connection
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Main configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct RpcConfig {
    /// Server-specific configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Client-specific configuration
    #[serde(default)]
    pub client: ClientConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl RpcConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables on top of the defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("TINYRPC_SERVER_ADDRESS") {
            config.server.address = addr;
        }

        if let Ok(addr) = std::env::var("TINYRPC_CLIENT_ADDRESS") {
            config.client.address = addr;
        }

        if let Ok(tag) = std::env::var("TINYRPC_COMPRESSION") {
            let tag = tag.parse::<u16>().map_err(|e| {
                ProtocolError::ConfigError(format!("Invalid TINYRPC_COMPRESSION '{tag}': {e}"))
            })?;
            config.client.compression = CompressionType(tag);
        }

        if let Ok(name) = std::env::var("TINYRPC_SERIALIZER") {
            let serializer = parse_serializer(&name)?;
            config.client.serializer = serializer;
            config.server.serializer = serializer;
        }

        if let Ok(timeout) = std::env::var("TINYRPC_REQUEST_TIMEOUT_MS") {
            if let Ok(val) = timeout.parse::<u64>() {
                config.client.request_timeout = Duration::from_millis(val);
            }
        }

        if let Ok(size) = std::env::var("TINYRPC_MAX_FRAME_SIZE") {
            if let Ok(val) = size.parse::<usize>() {
                config.client.max_frame_size = val;
                config.server.max_frame_size = val;
            }
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.server.validate());
        errors.extend(self.client.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        into_result(self.validate())
    }
}

fn into_result(errors: Vec<String>) -> Result<()> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ProtocolError::ConfigError(format!(
            "Configuration validation failed:\n  - {}",
            errors.join("\n  - ")
        )))
    }
}

fn parse_serializer(name: &str) -> Result<Serializer> {
    match name.to_ascii_lowercase().as_str() {
        "bincode" => Ok(Serializer::Bincode),
        "json" => Ok(Serializer::Json),
        "messagepack" | "msgpack" => Ok(Serializer::MessagePack),
        other => Err(ProtocolError::ConfigError(format!(
            "Unknown serializer: '{other}'"
        ))),
    }
}

fn has_port(address: &str) -> bool {
    address
        .rsplit_once(':')
        .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok())
}

fn validate_frame_size(max_frame_size: usize, errors: &mut Vec<String>) {
    if max_frame_size == 0 {
        errors.push("Max frame size cannot be 0".to_string());
    } else if max_frame_size < 1024 {
        errors.push("Max frame size too small (minimum: 1 KB)".to_string());
    } else if max_frame_size > u32::MAX as usize {
        errors.push(format!(
            "Max frame size too large: {max_frame_size} bytes (bodies must stay below 4 GiB)"
        ));
    }
}

/// Server-specific configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server listen address (e.g., "127.0.0.1:9000")
    pub address: String,

    /// Serializer used for request arguments and replies
    pub serializer: Serializer,

    /// Maximum frame payload accepted or produced
    pub max_frame_size: usize,

    /// Maximum number of concurrently served connections
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: String::from("127.0.0.1:9000"),
            serializer: Serializer::default(),
            max_frame_size: MAX_FRAME_SIZE,
            max_connections: 1000,
        }
    }
}

impl ServerConfig {
    /// Select the serializer
    pub fn with_serializer(mut self, serializer: Serializer) -> Self {
        self.serializer = serializer;
        self
    }

    /// Override the frame size limit
    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    /// Validate server configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.address.is_empty() {
            errors.push("Server address cannot be empty".to_string());
        } else if self.address.parse::<std::net::SocketAddr>().is_err() {
            errors.push(format!(
                "Invalid server address format: '{}' (expected format: '0.0.0.0:8080')",
                self.address
            ));
        }

        validate_frame_size(self.max_frame_size, &mut errors);

        if self.max_connections == 0 {
            errors.push("Max connections must be greater than 0".to_string());
        } else if self.max_connections > 100_000 {
            errors.push(format!(
                "Max connections very high: {} (ensure system resources can support this)",
                self.max_connections
            ));
        }

        errors
    }

    /// Validate and return Result
    pub fn validate_strict(&self) -> Result<()> {
        into_result(self.validate())
    }
}

/// Client-specific configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Target server address
    pub address: String,

    /// Compression tag applied to every request body
    pub compression: CompressionType,

    /// Serializer used for call arguments and replies
    pub serializer: Serializer,

    /// Maximum frame payload accepted or produced
    pub max_frame_size: usize,

    /// Timeout for connection attempts
    #[serde(with = "duration_serde")]
    pub connection_timeout: Duration,

    /// Deadline for a single call, from request write to reply
    #[serde(with = "duration_serde")]
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: String::from("127.0.0.1:9000"),
            compression: CompressionType::RAW,
            serializer: Serializer::default(),
            max_frame_size: MAX_FRAME_SIZE,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// Select the compression tag for outgoing requests
    pub fn with_compression(mut self, compression: CompressionType) -> Self {
        self.compression = compression;
        self
    }

    /// Select the serializer
    pub fn with_serializer(mut self, serializer: Serializer) -> Self {
        self.serializer = serializer;
        self
    }

    /// Override the per-call deadline
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Override the frame size limit
    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    /// Validate client configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.address.is_empty() {
            errors.push("Client address cannot be empty".to_string());
        } else if !has_port(&self.address) {
            errors.push(format!(
                "Invalid client address format: '{}' (expected format: 'host:port')",
                self.address
            ));
        }

        if !CompressorRegistry::builtin().contains(self.compression) {
            errors.push(format!(
                "Unsupported compression type: {} (built-in: 0=raw, 1=gzip, 2=snappy, 3=zlib)",
                self.compression.as_u16()
            ));
        }

        validate_frame_size(self.max_frame_size, &mut errors);

        if self.connection_timeout.as_millis() < 100 {
            errors.push("Connection timeout too short (minimum: 100ms)".to_string());
        }

        if self.request_timeout.as_millis() < 10 {
            errors.push("Request timeout too short (minimum: 10ms)".to_string());
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("tinyrpc"),
            log_level: Level::INFO,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
