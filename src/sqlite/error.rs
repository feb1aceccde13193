//! SQLite error types.

use rusqlite::ffi;

use crate::pg::SqlState;

pub type SqliteResult<T> = Result<T, SqliteError>;

/// SQLite-specific errors.
#[derive(Debug)]
pub enum SqliteError {
    /// SQLite error from rusqlite
    Sqlite(rusqlite::Error),
    /// Failure inside the async connection worker
    Worker(String),
    /// Connection closed
    ConnectionClosed,
}

impl SqliteError {
    /// SQLSTATE reported to the client for this failure.
    pub fn sql_state(&self) -> SqlState {
        let SqliteError::Sqlite(err) = self else {
            return SqlState::INTERNAL_ERROR;
        };

        if let rusqlite::Error::SqliteFailure(failure, _) = err {
            match failure.extended_code {
                ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                    return SqlState::UNIQUE_VIOLATION
                }
                ffi::SQLITE_CONSTRAINT_NOTNULL => return SqlState::NOT_NULL_VIOLATION,
                ffi::SQLITE_CONSTRAINT_FOREIGNKEY => return SqlState::FOREIGN_KEY_VIOLATION,
                ffi::SQLITE_CONSTRAINT_CHECK => return SqlState::CHECK_VIOLATION,
                _ => {}
            }
        }

        // Schema errors, and constraint failures without an extended code, only carry a message.
        let message = err.to_string();
        if message.contains("UNIQUE constraint failed") {
            SqlState::UNIQUE_VIOLATION
        } else if message.contains("NOT NULL constraint failed") {
            SqlState::NOT_NULL_VIOLATION
        } else if message.contains("no such table") {
            SqlState::UNDEFINED_TABLE
        } else if message.contains("already exists") {
            SqlState::DUPLICATE_TABLE
        } else if message.contains("no such column") {
            SqlState::UNDEFINED_COLUMN
        } else if message.contains("syntax error") {
            SqlState::SYNTAX_ERROR
        } else {
            SqlState::INTERNAL_ERROR
        }
    }

    /// Message text for an ErrorResponse, without the driver prefix.
    pub fn client_message(&self) -> String {
        match self {
            SqliteError::Sqlite(e) => e.to_string(),
            other => other.to_string(),
        }
    }
}

impl std::fmt::Display for SqliteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqliteError::Sqlite(e) => write!(f, "SQLite error: {}", e),
            SqliteError::Worker(e) => write!(f, "SQLite worker error: {}", e),
            SqliteError::ConnectionClosed => write!(f, "Connection closed"),
        }
    }
}

impl std::error::Error for SqliteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SqliteError::Sqlite(e) => Some(e),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for SqliteError {
    fn from(e: rusqlite::Error) -> Self {
        SqliteError::Sqlite(e)
    }
}

impl From<tokio_rusqlite::Error> for SqliteError {
    fn from(e: tokio_rusqlite::Error) -> Self {
        match e {
            tokio_rusqlite::Error::Rusqlite(e) => SqliteError::Sqlite(e),
            tokio_rusqlite::Error::ConnectionClosed => SqliteError::ConnectionClosed,
            other => SqliteError::Worker(other.to_string()),
        }
    }
}
