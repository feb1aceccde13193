//! Error types for the PostgreSQL protocol implementation.

use std::fmt;
use std::io;

/// Result type for PostgreSQL protocol operations.
pub type PgResult<T> = Result<T, PgError>;

/// Errors that can occur while speaking the wire protocol.
#[derive(Debug)]
pub enum PgError {
    /// I/O error during communication.
    Io(io::Error),

    /// Protocol error (bad framing, unexpected message, invalid format, etc.).
    Protocol(String),

    /// Startup packet declared a protocol version other than 3.0.
    UnsupportedProtocolVersion(i32),

    /// Declared message length exceeds the configured maximum.
    MessageTooLarge { len: usize, max: usize },

    /// Peer closed the connection.
    ConnectionClosed,
}

impl PgError {
    /// Whether the error came from the protocol layer rather than the transport.
    ///
    /// Protocol violations get a FATAL ErrorResponse before the socket is
    /// closed; transport errors do not.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, PgError::Protocol(_) | PgError::MessageTooLarge { .. })
    }
}

impl fmt::Display for PgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PgError::Io(e) => write!(f, "I/O error: {}", e),
            PgError::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            PgError::UnsupportedProtocolVersion(version) => write!(
                f,
                "Unsupported protocol version {}.{}",
                version >> 16,
                version & 0xffff
            ),
            PgError::MessageTooLarge { len, max } => {
                write!(f, "Message too large: {} bytes (max {})", len, max)
            }
            PgError::ConnectionClosed => write!(f, "Connection is closed"),
        }
    }
}

impl std::error::Error for PgError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PgError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for PgError {
    fn from(e: io::Error) -> Self {
        PgError::Io(e)
    }
}

// ============================================================================
// SQLSTATE codes
// ============================================================================

/// A five-character SQLSTATE code as carried in the `C` field of an
/// ErrorResponse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SqlState(&'static str);

impl SqlState {
    pub const PROTOCOL_VIOLATION: SqlState = SqlState("08P01");
    pub const FEATURE_NOT_SUPPORTED: SqlState = SqlState("0A000");
    pub const SYNTAX_ERROR: SqlState = SqlState("42601");
    pub const UNDEFINED_TABLE: SqlState = SqlState("42P01");
    pub const DUPLICATE_TABLE: SqlState = SqlState("42P07");
    pub const UNDEFINED_COLUMN: SqlState = SqlState("42703");
    pub const NOT_NULL_VIOLATION: SqlState = SqlState("23502");
    pub const FOREIGN_KEY_VIOLATION: SqlState = SqlState("23503");
    pub const UNIQUE_VIOLATION: SqlState = SqlState("23505");
    pub const CHECK_VIOLATION: SqlState = SqlState("23514");
    pub const INTERNAL_ERROR: SqlState = SqlState("XX000");

    #[inline]
    pub fn code(self) -> &'static str {
        self.0
    }
}

impl fmt::Display for SqlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// ErrorResponse severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Fatal,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
        }
    }
}
