//! PostgreSQL wire protocol implementation (server side).
//!
//! Architecture:
//! - `protocol`: Message framing, reassembly, encoding/decoding
//! - `types`: Type OIDs and text-format value rendering
//! - `error`: Protocol errors and SQLSTATE codes

pub mod error;
pub mod protocol;
pub mod types;

#[cfg(test)]
mod tests;

pub use error::{PgError, PgResult, Severity, SqlState};
pub use protocol::{
    BackendMessage, FieldDescription, FrontendMessage, Origin, RawMessage, StartupRequest,
    TransactionStatus,
};
pub use types::Oid;
