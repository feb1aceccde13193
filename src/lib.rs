//! pgmimic - a PostgreSQL wire protocol front end for an embedded SQLite
//! database.
//!
//! Clients speak protocol 3.0 simple queries; statements are translated from
//! the PostgreSQL dialect and run on one shared SQLite connection.

pub mod config;
pub mod error;
pub mod pg;
pub mod projector;
pub mod schema;
pub mod server;
pub mod session;
pub mod sqlite;
pub mod translate;

pub use config::{ReturningCompletion, ServerConfig};
pub use error::{Result, ServerError};
pub use server::{handle_connection, Server};
pub use session::Session;
