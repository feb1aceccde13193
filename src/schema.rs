//! Schema registry: declared column types of the tables created through the
//! server.
//!
//! SQLite only remembers storage affinities, so BIGINT and INTEGER (or REAL
//! and DOUBLE PRECISION) look the same once a table exists. The registry keeps
//! the PostgreSQL types as declared, so result columns can be described with
//! the type the client asked for. It is shared by every session.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::sqlite::{SqliteConnection, SqliteResult, SqliteValue};
use crate::translate::{ColumnDefinition, CreateTable, SourceType};

/// Information about a declared column.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: SourceType,
    pub nullable: bool,
    pub default: Option<String>,
    pub is_primary_key: bool,
}

impl From<&ColumnDefinition> for ColumnInfo {
    fn from(column: &ColumnDefinition) -> Self {
        Self {
            name: column.name.clone(),
            data_type: column.source_type,
            nullable: column.nullable,
            default: column.default.clone(),
            is_primary_key: column.primary_key,
        }
    }
}

/// Information about a declared table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableInfo {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
}

impl TableInfo {
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }
}

impl From<&CreateTable> for TableInfo {
    fn from(create: &CreateTable) -> Self {
        Self {
            name: create.table.clone(),
            columns: create.columns.iter().map(ColumnInfo::from).collect(),
        }
    }
}

/// Table name to declared columns, keyed case-insensitively like SQLite.
#[derive(Clone, Default)]
pub struct SchemaRegistry {
    tables: Arc<RwLock<HashMap<String, Arc<TableInfo>>>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a table after its CREATE TABLE succeeded.
    ///
    /// With IF NOT EXISTS the engine kept any existing table, so the existing
    /// entry is kept too.
    pub fn register(&self, create: &CreateTable) {
        let key = create.table.to_lowercase();
        let info = Arc::new(TableInfo::from(create));
        let mut tables = self.tables.write();
        if create.if_not_exists {
            tables.entry(key).or_insert(info);
        } else {
            tables.insert(key, info);
        }
        debug!(table = %create.table, "registered table");
    }

    /// Forget a dropped table. Returns whether it was known.
    pub fn drop_table(&self, table: &str) -> bool {
        let removed = self.tables.write().remove(&table.to_lowercase()).is_some();
        if removed {
            debug!(table = %table, "evicted table");
        }
        removed
    }

    pub fn table(&self, table: &str) -> Option<Arc<TableInfo>> {
        self.tables.read().get(&table.to_lowercase()).cloned()
    }

    /// Declared type of `table.column`, if both are known.
    pub fn declared_type(&self, table: &str, column: &str) -> Option<SourceType> {
        let tables = self.tables.read();
        let info = tables.get(&table.to_lowercase())?;
        info.column(column).map(|c| c.data_type)
    }

    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.read().values().map(|t| t.name.clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tables.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.read().is_empty()
    }

    /// Register the tables already present in a database file.
    ///
    /// Only SQLite's declared types are available here, so these columns
    /// resolve to INTEGER, REAL or TEXT.
    pub async fn load_existing(&self, conn: &SqliteConnection) -> SqliteResult<usize> {
        let tables = conn.query(SQLITE_TABLES_QUERY, &[]).await?;
        let mut loaded = 0;

        for row in &tables.rows {
            let Some(name) = row.first().and_then(SqliteValue::as_str) else {
                continue;
            };
            let info = conn.query(&sqlite_table_info_pragma(name), &[]).await?;
            let columns = info.rows.iter().filter_map(|row| column_from_pragma_row(row)).collect();

            self.tables.write().insert(
                name.to_lowercase(),
                Arc::new(TableInfo {
                    name: name.to_string(),
                    columns,
                }),
            );
            loaded += 1;
        }

        if loaded > 0 {
            debug!(tables = loaded, "loaded existing tables");
        }
        Ok(loaded)
    }
}

// ============================================================================
// SQLite Schema Introspection
// ============================================================================

/// Query to get all table names in SQLite
pub const SQLITE_TABLES_QUERY: &str = r#"
SELECT name
FROM sqlite_master
WHERE type = 'table'
  AND name NOT LIKE 'sqlite_%'
ORDER BY name
"#;

/// SQLite PRAGMA for table info - returns cid, name, type, notnull, dflt_value, pk
pub fn sqlite_table_info_pragma(table: &str) -> String {
    format!("PRAGMA table_info('{}')", table.replace('\'', "''"))
}

fn column_from_pragma_row(row: &[SqliteValue]) -> Option<ColumnInfo> {
    let [_, name, data_type, notnull, default, pk] = row else {
        return None;
    };
    let words: Vec<String> = data_type
        .as_str()
        .unwrap_or_default()
        .split_whitespace()
        .map(str::to_ascii_uppercase)
        .collect();

    Some(ColumnInfo {
        name: name.as_str()?.to_string(),
        data_type: SourceType::from_type_words(&words),
        nullable: notnull.as_i64() == Some(0),
        default: default.as_str().map(str::to_string),
        is_primary_key: pk.as_i64().is_some_and(|pk| pk > 0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translate::{parse, Statement};

    fn create(sql: &str) -> CreateTable {
        match parse(sql).unwrap().statement {
            Statement::CreateTable(create) => create,
            other => panic!("expected CREATE TABLE, got {:?}", other),
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = SchemaRegistry::new();
        registry.register(&create(
            "CREATE TABLE Users (id BIGSERIAL PRIMARY KEY, score DOUBLE PRECISION, name TEXT)",
        ));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.declared_type("users", "id"), Some(SourceType::BigInt));
        assert_eq!(
            registry.declared_type("USERS", "Score"),
            Some(SourceType::DoublePrecision)
        );
        assert_eq!(registry.declared_type("users", "missing"), None);
        assert_eq!(registry.declared_type("other", "id"), None);

        let table = registry.table("users").unwrap();
        assert_eq!(table.name, "Users");
        assert!(table.column("id").unwrap().is_primary_key);
        assert!(!table.column("id").unwrap().nullable);
    }

    #[test]
    fn test_if_not_exists_keeps_existing() {
        let registry = SchemaRegistry::new();
        registry.register(&create("CREATE TABLE t (a BIGINT)"));
        registry.register(&create("CREATE TABLE IF NOT EXISTS t (a REAL)"));
        assert_eq!(registry.declared_type("t", "a"), Some(SourceType::BigInt));
    }

    #[test]
    fn test_drop_table() {
        let registry = SchemaRegistry::new();
        registry.register(&create("CREATE TABLE t (a INT)"));
        assert!(registry.drop_table("T"));
        assert!(!registry.drop_table("t"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_shared_between_clones() {
        let registry = SchemaRegistry::new();
        let other = registry.clone();
        registry.register(&create("CREATE TABLE b (x INT)"));
        registry.register(&create("CREATE TABLE a (x INT)"));
        assert_eq!(other.table_names(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_load_existing() {
        let conn = SqliteConnection::open(":memory:").await.unwrap();
        conn.query(
            "CREATE TABLE items ( id INTEGER NOT NULL PRIMARY KEY, price REAL NULL, label TEXT NOT NULL DEFAULT 'x' )",
            &[],
        )
        .await
        .unwrap();

        let registry = SchemaRegistry::new();
        assert_eq!(registry.load_existing(&conn).await.unwrap(), 1);

        let table = registry.table("items").unwrap();
        assert_eq!(table.columns.len(), 3);
        assert_eq!(table.column("id").unwrap().data_type, SourceType::Integer);
        assert!(table.column("id").unwrap().is_primary_key);
        assert_eq!(table.column("price").unwrap().data_type, SourceType::Real);
        assert!(table.column("price").unwrap().nullable);
        assert_eq!(table.column("label").unwrap().default.as_deref(), Some("'x'"));
    }
}
