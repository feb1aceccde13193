//! SQLite connection implementation.

use tokio_rusqlite::Connection;

use super::error::SqliteResult;
use super::types::SqliteValue;

/// Fixed follow-up statement that reads the rows changed by the statement
/// before it on the same connection.
pub const CHANGES_QUERY: &str = "SELECT changes()";

/// Result of a statement execution.
#[derive(Debug, Default)]
pub struct QueryResult {
    /// Column names, known even when no rows come back
    pub columns: Vec<String>,
    /// Declared type of the table column each result column reads, `None`
    /// for expressions
    pub decl_types: Vec<Option<String>>,
    /// Row data, one value per column
    pub rows: Vec<Vec<SqliteValue>>,
    /// Rows changed (only filled in by `query_counted`)
    pub rows_affected: u64,
}

/// The shared SQLite connection every session executes against.
///
/// `tokio_rusqlite` runs the connection on its own thread and handles calls
/// one at a time, so statements from concurrent sessions never overlap.
pub struct SqliteConnection {
    conn: Connection,
}

impl SqliteConnection {
    /// Open a SQLite database.
    ///
    /// Supports:
    /// - `:memory:` for in-memory database
    /// - File path for disk-based database
    ///
    /// Automatically enables WAL mode for file-based databases.
    pub async fn open(path: &str) -> SqliteResult<Self> {
        let is_memory = path == ":memory:";
        let conn = if is_memory {
            Connection::open_in_memory().await?
        } else {
            Connection::open(path).await?
        };

        if !is_memory {
            conn.call(|c| {
                c.execute_batch(
                    "PRAGMA journal_mode=WAL;
                     PRAGMA synchronous=NORMAL;
                     PRAGMA busy_timeout=5000;",
                )?;
                Ok(())
            })
            .await?;
        }

        Ok(Self { conn })
    }

    /// Execute a statement and return its columns and rows.
    pub async fn query(&self, sql: &str, params: &[SqliteValue]) -> SqliteResult<QueryResult> {
        let sql = sql.to_string();
        let params: Vec<SqliteValue> = params.to_vec();

        let result = self
            .conn
            .call(move |conn| Ok(run_statement(conn, &sql, &params)?))
            .await?;

        Ok(result)
    }

    /// Execute a statement, then read `changes()` in the same worker call so
    /// no other session's statement can land in between.
    pub async fn query_counted(
        &self,
        sql: &str,
        params: &[SqliteValue],
    ) -> SqliteResult<QueryResult> {
        let sql = sql.to_string();
        let params: Vec<SqliteValue> = params.to_vec();

        let result = self
            .conn
            .call(move |conn| {
                let mut result = run_statement(conn, &sql, &params)?;
                let changed: i64 = conn.query_row(CHANGES_QUERY, [], |row| row.get(0))?;
                result.rows_affected = changed.max(0) as u64;
                Ok(result)
            })
            .await?;

        Ok(result)
    }
}

fn run_statement(
    conn: &rusqlite::Connection,
    sql: &str,
    params: &[SqliteValue],
) -> rusqlite::Result<QueryResult> {
    // Not prepare_cached: a cached statement keeps its old column set after
    // the table it reads is dropped and created again.
    let mut stmt = conn.prepare(sql)?;

    let (columns, decl_types): (Vec<String>, Vec<Option<String>>) = stmt
        .columns()
        .iter()
        .map(|c| (c.name().to_string(), c.decl_type().map(str::to_string)))
        .unzip();

    let params_refs: Vec<&dyn rusqlite::ToSql> =
        params.iter().map(|p| p as &dyn rusqlite::ToSql).collect();

    // Stepping the cursor is what executes DDL and DML, so this path serves
    // every statement kind.
    let mut rows_data = Vec::new();
    let mut rows = stmt.query(params_refs.as_slice())?;

    while let Some(row) = rows.next()? {
        let mut row_values = Vec::with_capacity(columns.len());
        for i in 0..columns.len() {
            row_values.push(SqliteValue::from_value_ref(row.get_ref(i)?));
        }
        rows_data.push(row_values);
    }

    Ok(QueryResult {
        columns,
        decl_types,
        rows: rows_data,
        rows_affected: 0,
    })
}
