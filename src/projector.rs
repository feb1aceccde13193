//! Result projection: SQLite rows to RowDescription and DataRow payloads.

use bytes::Bytes;
use smallvec::SmallVec;

use crate::pg::{BackendMessage, FieldDescription, Oid};
use crate::schema::SchemaRegistry;
use crate::sqlite::{QueryResult, SqliteValue};
use crate::translate::{SourceType, TargetType};

/// Wire type of a declared column type.
pub fn declared_oid(source: SourceType) -> Oid {
    match source {
        SourceType::Integer => Oid::INT4,
        SourceType::BigInt => Oid::INT8,
        SourceType::Real => Oid::FLOAT4,
        SourceType::DoublePrecision => Oid::FLOAT8,
        SourceType::Text => Oid::TEXT,
    }
}

/// One DataRow worth of text values. Inline for rows of up to 16 columns.
pub type ProjectedRow = SmallVec<[Option<Bytes>; 16]>;

/// A result set in wire form.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub fields: Vec<FieldDescription>,
    pub rows: Vec<ProjectedRow>,
}

impl Projection {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// RowDescription followed by one DataRow per row.
    pub fn into_messages(self) -> impl Iterator<Item = BackendMessage> {
        std::iter::once(BackendMessage::RowDescription {
            fields: self.fields,
        })
        .chain(self.rows.into_iter().map(|row| BackendMessage::DataRow {
            values: row.into_vec(),
        }))
    }
}

/// Describe and serialize a result.
///
/// A column declared on `source_table` takes its type from the registry,
/// provided the result column still carries that column's data: SQLite's
/// declared type must agree with it and no value may be of another storage
/// class. Any other column is typed from its first non-NULL value.
pub fn project(
    result: &QueryResult,
    source_table: Option<&str>,
    registry: &SchemaRegistry,
) -> Projection {
    let table = source_table.and_then(|name| registry.table(name));

    let fields = result
        .columns
        .iter()
        .enumerate()
        .map(|(index, name)| {
            let oid = table
                .as_ref()
                .and_then(|t| t.column(name))
                .filter(|c| carries_declared(result, index, c.data_type.target()))
                .map(|c| declared_oid(c.data_type))
                .unwrap_or_else(|| sampled_oid(result, index));
            FieldDescription::text(name.clone(), (index + 1) as i16, oid)
        })
        .collect();

    let rows = result
        .rows
        .iter()
        .map(|row| row.iter().map(SqliteValue::to_pg_text).collect())
        .collect();

    Projection { fields, rows }
}

fn carries_declared(result: &QueryResult, index: usize, target: TargetType) -> bool {
    let decl_agrees = match result.decl_types.get(index).and_then(Option::as_deref) {
        Some(decl) => affinity(decl) == Some(target),
        None => true,
    };

    decl_agrees
        && result
            .rows
            .iter()
            .filter_map(|row| row.get(index))
            .all(|value| match (target, value) {
                (_, SqliteValue::Null) => true,
                (TargetType::Integer, SqliteValue::Integer(_)) => true,
                (TargetType::Real, SqliteValue::Integer(_) | SqliteValue::Real(_)) => true,
                (TargetType::Text, SqliteValue::Blob(_)) => false,
                (TargetType::Text, _) => true,
                _ => false,
            })
}

/// SQLite's column affinity rules, limited to the three storage types a
/// translated table declares.
fn affinity(decl: &str) -> Option<TargetType> {
    let decl = decl.to_ascii_uppercase();
    if decl.contains("INT") {
        Some(TargetType::Integer)
    } else if ["CHAR", "CLOB", "TEXT"].iter().any(|s| decl.contains(s)) {
        Some(TargetType::Text)
    } else if ["REAL", "FLOA", "DOUB"].iter().any(|s| decl.contains(s)) {
        Some(TargetType::Real)
    } else {
        None
    }
}

fn sampled_oid(result: &QueryResult, index: usize) -> Oid {
    result
        .rows
        .iter()
        .filter_map(|row| row.get(index))
        .find(|value| !value.is_null())
        .map_or(Oid::TEXT, SqliteValue::inferred_oid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translate::{parse, Statement};

    fn registry_with(sql: &str) -> SchemaRegistry {
        let registry = SchemaRegistry::new();
        match parse(sql).unwrap().statement {
            Statement::CreateTable(create) => registry.register(&create),
            other => panic!("expected CREATE TABLE, got {:?}", other),
        }
        registry
    }

    fn result(columns: &[&str], rows: Vec<Vec<SqliteValue>>) -> QueryResult {
        QueryResult {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            decl_types: vec![None; columns.len()],
            rows,
            rows_affected: 0,
        }
    }

    #[test]
    fn test_declared_types_win() {
        let registry = registry_with(
            "CREATE TABLE m (a INT, b BIGINT, c REAL, d DOUBLE PRECISION, e TEXT)",
        );
        let result = result(
            &["a", "b", "c", "d", "e"],
            vec![vec![
                SqliteValue::Integer(1),
                SqliteValue::Integer(2),
                SqliteValue::Real(1.5),
                SqliteValue::Real(2.5),
                SqliteValue::Integer(7),
            ]],
        );

        let projection = project(&result, Some("m"), &registry);
        let oids: Vec<Oid> = projection.fields.iter().map(|f| f.type_oid).collect();
        assert_eq!(
            oids,
            vec![Oid::INT4, Oid::INT8, Oid::FLOAT4, Oid::FLOAT8, Oid::TEXT]
        );
        let attrs: Vec<i16> = projection.fields.iter().map(|f| f.column_attr).collect();
        assert_eq!(attrs, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_sampled_types_without_schema() {
        let registry = SchemaRegistry::new();
        let result = result(
            &["n", "r", "t", "b", "z"],
            vec![
                vec![
                    SqliteValue::Null,
                    SqliteValue::Real(30.0),
                    SqliteValue::Text("x".into()),
                    SqliteValue::Blob(vec![0xde, 0xad]),
                    SqliteValue::Null,
                ],
                vec![
                    SqliteValue::Integer(5),
                    SqliteValue::Null,
                    SqliteValue::Null,
                    SqliteValue::Null,
                    SqliteValue::Null,
                ],
            ],
        );

        let projection = project(&result, None, &registry);
        let oids: Vec<Oid> = projection.fields.iter().map(|f| f.type_oid).collect();
        assert_eq!(
            oids,
            vec![Oid::INT4, Oid::FLOAT8, Oid::TEXT, Oid::BYTEA, Oid::TEXT]
        );

        assert_eq!(
            projection.rows[0].as_slice(),
            &[
                None,
                Some(Bytes::from_static(b"30")),
                Some(Bytes::from_static(b"x")),
                Some(Bytes::from_static(b"\\xdead")),
                None,
            ]
        );
    }

    #[test]
    fn test_unknown_column_falls_back() {
        let registry = registry_with("CREATE TABLE users (id BIGINT, name TEXT)");
        let result = result(&["total"], vec![vec![SqliteValue::Integer(2)]]);

        let projection = project(&result, Some("users"), &registry);
        assert_eq!(projection.fields[0].type_oid, Oid::INT4);
    }

    #[test]
    fn test_alias_over_declared_name_is_sampled() {
        let registry = registry_with("CREATE TABLE users (id INT, name TEXT)");

        // SELECT name AS id FROM users
        let mut aliased = result(&["id"], vec![vec![SqliteValue::Text("Alice".into())]]);
        aliased.decl_types = vec![Some("TEXT".to_string())];
        let projection = project(&aliased, Some("users"), &registry);
        assert_eq!(projection.fields[0].type_oid, Oid::TEXT);

        // SELECT 'x' AS id FROM users
        let literal = result(&["id"], vec![vec![SqliteValue::Text("x".into())]]);
        let projection = project(&literal, Some("users"), &registry);
        assert_eq!(projection.fields[0].type_oid, Oid::TEXT);

        // SELECT id FROM users
        let mut direct = result(&["id"], vec![vec![SqliteValue::Integer(1)]]);
        direct.decl_types = vec![Some("INTEGER".to_string())];
        let projection = project(&direct, Some("users"), &registry);
        assert_eq!(projection.fields[0].type_oid, Oid::INT4);
    }

    #[test]
    fn test_affinity() {
        assert_eq!(affinity("INTEGER"), Some(TargetType::Integer));
        assert_eq!(affinity("bigint"), Some(TargetType::Integer));
        assert_eq!(affinity("VARCHAR(20)"), Some(TargetType::Text));
        assert_eq!(affinity("DOUBLE"), Some(TargetType::Real));
        assert_eq!(affinity("NUMERIC"), None);
    }

    #[test]
    fn test_zero_rows_keep_columns() {
        let registry = SchemaRegistry::new();
        let result = result(&["id", "name"], vec![]);

        let projection = project(&result, None, &registry);
        assert_eq!(projection.row_count(), 0);

        let messages: Vec<BackendMessage> = projection.into_messages().collect();
        assert_eq!(messages.len(), 1);
        match &messages[0] {
            BackendMessage::RowDescription { fields } => {
                let names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
                assert_eq!(names, vec!["id", "name"]);
                assert!(fields.iter().all(|f| f.type_oid == Oid::TEXT));
            }
            other => panic!("expected RowDescription, got {:?}", other),
        }
    }
}
