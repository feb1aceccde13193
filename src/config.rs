//! Server configuration.

use std::fmt;
use std::str::FromStr;

use crate::error::{Result, ServerError};
use crate::pg::protocol::DEFAULT_MAX_MESSAGE_SIZE;

/// How an INSERT ... RETURNING is completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturningCompletion {
    /// Queue CommandComplete and send it, with ReadyForQuery, on the next Sync.
    #[default]
    Deferred,
    /// Send CommandComplete and ReadyForQuery right after the rows.
    Immediate,
}

impl FromStr for ReturningCompletion {
    type Err = ServerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "deferred" => Ok(ReturningCompletion::Deferred),
            "immediate" => Ok(ReturningCompletion::Immediate),
            other => Err(ServerError::ConfigError(format!(
                "Invalid returning completion mode: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for ReturningCompletion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReturningCompletion::Deferred => f.write_str("deferred"),
            ReturningCompletion::Immediate => f.write_str("immediate"),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Hostname or IP address to listen on (default: localhost)
    pub host: String,
    /// Port number (default: 5432)
    pub port: u16,
    /// SQLite database path, `:memory:` for an in-memory database
    pub database: String,
    /// Reported as the `server_version` parameter (default: 13.3)
    pub server_version: String,
    /// Reported as the `client_encoding` parameter (default: UTF8)
    pub client_encoding: String,
    /// Reported as the `TimeZone` parameter (default: UTC)
    pub time_zone: String,
    /// Largest accepted frontend message, in bytes
    pub max_message_size: usize,
    pub returning_completion: ReturningCompletion,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: ":memory:".to_string(),
            server_version: "13.3".to_string(),
            client_encoding: "UTF8".to_string(),
            time_zone: "UTC".to_string(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            returning_completion: ReturningCompletion::Deferred,
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a listen URL.
    ///
    /// Format: `pgmimic://host:port/path/to/db.sqlite`. Port and path are
    /// optional; no path means an in-memory database.
    pub fn from_url(url: &str) -> Result<Self> {
        let rest = url
            .strip_prefix("pgmimic://")
            .ok_or_else(|| ServerError::ConfigError(format!("Invalid URL scheme: {}", url)))?;

        let (host_port, database) = match rest.find('/') {
            Some(slash_pos) => (&rest[..slash_pos], &rest[slash_pos + 1..]),
            None => (rest, ""),
        };

        let mut config = Self::default();

        if let Some(colon_pos) = host_port.rfind(':') {
            let port_str = &host_port[colon_pos + 1..];
            config.port = port_str
                .parse::<u16>()
                .map_err(|_| ServerError::ConfigError(format!("Invalid port: {}", port_str)))?;
            config.host = host_port[..colon_pos].to_string();
        } else if !host_port.is_empty() {
            config.host = host_port.to_string();
        }

        if config.host.is_empty() {
            return Err(ServerError::ConfigError("Missing host".to_string()));
        }
        if !database.is_empty() {
            config.database = database.to_string();
        }

        Ok(config)
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    pub fn server_version(mut self, version: impl Into<String>) -> Self {
        self.server_version = version.into();
        self
    }

    pub fn client_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.client_encoding = encoding.into();
        self
    }

    pub fn time_zone(mut self, time_zone: impl Into<String>) -> Self {
        self.time_zone = time_zone.into();
        self
    }

    pub fn max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    pub fn returning_completion(mut self, mode: ReturningCompletion) -> Self {
        self.returning_completion = mode;
        self
    }

    /// `host:port` as given to the listener.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// ParameterStatus pairs sent after authentication, in order.
    pub fn parameter_statuses(&self) -> [(&'static str, &str); 3] {
        [
            ("server_version", self.server_version.as_str()),
            ("client_encoding", self.client_encoding.as_str()),
            ("TimeZone", self.time_zone.as_str()),
        ]
    }
}
