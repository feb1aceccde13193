//! PostgreSQL to SQLite statement translation.
//!
//! This is a recognizer, not a SQL parser: the text is normalized and
//! tokenized, classified by its leading keywords, and then matched against the
//! fixed shape each statement kind must have. Only CREATE TABLE is rewritten;
//! every other supported kind is already valid SQLite once normalized.

mod create_table;
mod error;
mod insert;
mod lexer;


pub use create_table::{ColumnDefinition, CreateTable, SourceType, TargetType};
pub use error::{TranslateError, TranslateResult};
pub use insert::Insert;
pub use lexer::normalize;

use lexer::{find_top_level, Token};

/// Statement kinds the translator accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    CreateTable,
    Select,
    Insert,
    Update,
    Delete,
    Drop,
}

impl StatementKind {
    /// Leading keyword(s), also used as the completion tag prefix.
    pub fn keyword(self) -> &'static str {
        match self {
            StatementKind::CreateTable => "CREATE TABLE",
            StatementKind::Select => "SELECT",
            StatementKind::Insert => "INSERT",
            StatementKind::Update => "UPDATE",
            StatementKind::Delete => "DELETE",
            StatementKind::Drop => "DROP",
        }
    }
}

impl std::fmt::Display for StatementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.keyword())
    }
}

/// What was recognized, per kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    CreateTable(CreateTable),
    Select {
        /// First table named after FROM.
        table: Option<String>,
    },
    Insert(Insert),
    Update {
        table: Option<String>,
    },
    Delete {
        table: Option<String>,
    },
    Drop {
        /// Object keyword, e.g. `TABLE` or `INDEX`.
        object: Option<String>,
        /// Set only for `DROP TABLE`.
        table: Option<String>,
    },
}

/// A recognized statement and the SQLite text to run for it.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslatedStatement {
    pub original: String,
    pub translated: String,
    pub statement: Statement,
}

impl TranslatedStatement {
    pub fn kind(&self) -> StatementKind {
        match self.statement {
            Statement::CreateTable(_) => StatementKind::CreateTable,
            Statement::Select { .. } => StatementKind::Select,
            Statement::Insert(_) => StatementKind::Insert,
            Statement::Update { .. } => StatementKind::Update,
            Statement::Delete { .. } => StatementKind::Delete,
            Statement::Drop { .. } => StatementKind::Drop,
        }
    }

    /// Table whose declared columns describe this statement's result rows.
    pub fn source_table(&self) -> Option<&str> {
        match &self.statement {
            Statement::Select { table } => table.as_deref(),
            Statement::Insert(insert) => Some(&insert.table),
            _ => None,
        }
    }

    /// Whether the client expects a row set back.
    pub fn returns_rows(&self) -> bool {
        match &self.statement {
            Statement::Select { .. } => true,
            Statement::Insert(insert) => insert.returning.is_some(),
            _ => false,
        }
    }
}

/// Translate one PostgreSQL statement into SQLite.
pub fn parse(sql: &str) -> TranslateResult<TranslatedStatement> {
    let normalized = normalize(sql);
    let tokens = lexer::tokenize(&normalized)?;

    // The engine runs only the first statement of a batch.
    if tokens.iter().any(|t| t.is_symbol(';')) {
        return Err(TranslateError::malformed(
            "statement",
            "multiple statements in one query are not supported",
        ));
    }

    let kind = classify(&tokens).ok_or_else(|| {
        TranslateError::UnsupportedStatement(
            tokens
                .first()
                .map(|t| t.text.to_string())
                .unwrap_or_default(),
        )
    })?;

    let (statement, translated) = match kind {
        StatementKind::CreateTable => {
            let create = create_table::parse(&normalized, &tokens)?;
            let translated = create.to_sqlite();
            (Statement::CreateTable(create), translated)
        }
        StatementKind::Insert => {
            let insert = insert::parse(&normalized, &tokens)?;
            (Statement::Insert(insert), normalized.clone())
        }
        StatementKind::Select => {
            let table = table_after_keyword(&tokens, "FROM");
            (Statement::Select { table }, normalized.clone())
        }
        StatementKind::Update => {
            let at = if tokens.get(1).is_some_and(|t| t.is_keyword("ONLY")) {
                2
            } else {
                1
            };
            let table = table_name(&tokens, at).map(|(name, _)| name);
            (Statement::Update { table }, normalized.clone())
        }
        StatementKind::Delete => {
            let table = table_after_keyword(&tokens, "FROM");
            (Statement::Delete { table }, normalized.clone())
        }
        StatementKind::Drop => {
            let object = tokens.get(1).map(|t| t.upper());
            let table = if object.as_deref() == Some("TABLE") {
                let at = skip_if_exists(&tokens, 2);
                table_name(&tokens, at).map(|(name, _)| name)
            } else {
                None
            };
            (Statement::Drop { object, table }, normalized.clone())
        }
    };

    Ok(TranslatedStatement {
        original: sql.to_string(),
        translated,
        statement,
    })
}

/// Leading keyword match, first hit wins.
fn classify(tokens: &[Token<'_>]) -> Option<StatementKind> {
    let first = tokens.first()?;

    if first.is_keyword("CREATE") && tokens.get(1).is_some_and(|t| t.is_keyword("TABLE")) {
        Some(StatementKind::CreateTable)
    } else if first.is_keyword("SELECT") || first.is_keyword("WITH") {
        Some(StatementKind::Select)
    } else if first.is_keyword("INSERT") {
        Some(StatementKind::Insert)
    } else if first.is_keyword("UPDATE") {
        Some(StatementKind::Update)
    } else if first.is_keyword("DELETE") {
        Some(StatementKind::Delete)
    } else if first.is_keyword("DROP") {
        Some(StatementKind::Drop)
    } else {
        None
    }
}

// ============================================================================
// Shared shape helpers
// ============================================================================

/// Read a possibly schema-qualified table name at `at`.
///
/// Returns the unqualified name and the index after it.
pub(crate) fn table_name(tokens: &[Token<'_>], at: usize) -> Option<(String, usize)> {
    let first = tokens.get(at).filter(|t| t.is_identifier())?;

    let qualified = tokens.get(at + 1).is_some_and(|t| t.is_symbol('.'))
        && tokens.get(at + 2).is_some_and(|t| t.is_identifier());
    if qualified {
        let name = &tokens[at + 2];
        return Some((name.identifier_value(), at + 3));
    }

    Some((first.identifier_value(), at + 1))
}

/// Skip an `IF EXISTS` / `IF NOT EXISTS` guard at `at`.
pub(crate) fn skip_if_exists(tokens: &[Token<'_>], at: usize) -> usize {
    let is = |i: usize, kw: &str| tokens.get(i).is_some_and(|t| t.is_keyword(kw));
    if is(at, "IF") && is(at + 1, "EXISTS") {
        at + 2
    } else if is(at, "IF") && is(at + 1, "NOT") && is(at + 2, "EXISTS") {
        at + 3
    } else {
        at
    }
}

/// Table named right after the first top-level `keyword`.
fn table_after_keyword(tokens: &[Token<'_>], keyword: &str) -> Option<String> {
    let i = find_top_level(tokens, 0, keyword)?;
    let at = if tokens.get(i + 1).is_some_and(|t| t.is_keyword("ONLY")) {
        i + 2
    } else {
        i + 1
    };
    table_name(tokens, at).map(|(name, _)| name)
}
