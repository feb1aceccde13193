//! SQLite value type and its PostgreSQL text rendering.

use bytes::Bytes;
use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};

use crate::pg::types::{format_bytea, format_float, Oid};

/// A SQLite value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqliteValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl SqliteValue {
    /// Check if this value is NULL.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, SqliteValue::Null)
    }

    /// Convert from rusqlite ValueRef.
    pub fn from_value_ref(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => SqliteValue::Null,
            ValueRef::Integer(i) => SqliteValue::Integer(i),
            ValueRef::Real(f) => SqliteValue::Real(f),
            ValueRef::Text(s) => SqliteValue::Text(String::from_utf8_lossy(s).into_owned()),
            ValueRef::Blob(b) => SqliteValue::Blob(b.to_vec()),
        }
    }

    /// Try to get as i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqliteValue::Integer(i) => Some(*i),
            SqliteValue::Real(f) => Some(*f as i64),
            _ => None,
        }
    }

    /// Try to get as string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqliteValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Wire type for a column whose declared type is unknown, judged from
    /// this value's storage class.
    pub fn inferred_oid(&self) -> Oid {
        match self {
            SqliteValue::Integer(_) => Oid::INT4,
            SqliteValue::Real(_) => Oid::FLOAT8,
            SqliteValue::Blob(_) => Oid::BYTEA,
            SqliteValue::Null | SqliteValue::Text(_) => Oid::TEXT,
        }
    }

    /// Text-format wire value; `None` is SQL NULL.
    pub fn to_pg_text(&self) -> Option<Bytes> {
        match self {
            SqliteValue::Null => None,
            SqliteValue::Integer(i) => Some(Bytes::from(i.to_string())),
            SqliteValue::Real(f) => Some(Bytes::from(format_float(*f))),
            SqliteValue::Text(s) => Some(Bytes::copy_from_slice(s.as_bytes())),
            SqliteValue::Blob(b) => Some(Bytes::from(format_bytea(b))),
        }
    }
}

impl ToSql for SqliteValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            SqliteValue::Null => Ok(ToSqlOutput::Owned(rusqlite::types::Value::Null)),
            SqliteValue::Integer(i) => Ok(ToSqlOutput::Owned(rusqlite::types::Value::Integer(*i))),
            SqliteValue::Real(f) => Ok(ToSqlOutput::Owned(rusqlite::types::Value::Real(*f))),
            // Borrowed for Text and Blob to avoid cloning
            SqliteValue::Text(s) => Ok(ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes()))),
            SqliteValue::Blob(b) => Ok(ToSqlOutput::Borrowed(ValueRef::Blob(b))),
        }
    }
}
