//! SQLite backing engine.
//!
//! Translated statements run here through rusqlite, with tokio-rusqlite
//! moving the blocking calls off the async runtime.

pub mod connection;
pub mod error;
pub mod types;


pub use connection::{QueryResult, SqliteConnection, CHANGES_QUERY};
pub use error::{SqliteError, SqliteResult};
pub use types::SqliteValue;
