//! Error types for the pgmimic server.

use thiserror::Error;

use crate::pg::PgError;
use crate::sqlite::SqliteError;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Backing database error: {0}")]
    DatabaseError(#[from] SqliteError),

    #[error("Protocol error: {0}")]
    ProtocolError(#[from] PgError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ServerError>;
