//! CREATE TABLE recognition and rewriting.
//!
//! PostgreSQL column types collapse onto SQLite's three storage affinities we
//! care about. Serial types and identity columns become plain INTEGER primary
//! keys, which SQLite already numbers through rowid aliasing.

use std::borrow::Cow;

use super::error::{TranslateError, TranslateResult};
use super::lexer::{skip_group, span, split_top_level, tokenize, Token, TokenKind};
use super::{skip_if_exists, table_name};

const KIND: &str = "CREATE TABLE";

/// Keywords that end a column's type and open one of its constraints.
const COLUMN_KEYWORDS: &[&str] = &[
    "NOT",
    "NULL",
    "PRIMARY",
    "UNIQUE",
    "DEFAULT",
    "CHECK",
    "REFERENCES",
    "CONSTRAINT",
    "GENERATED",
    "COLLATE",
];

const SERIAL_TYPES: &[&str] = &[
    "SERIAL",
    "BIGSERIAL",
    "SMALLSERIAL",
    "SERIAL2",
    "SERIAL4",
    "SERIAL8",
];

/// PostgreSQL logical type of a declared column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceType {
    Integer,
    BigInt,
    Real,
    DoublePrecision,
    Text,
}

impl SourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceType::Integer => "INTEGER",
            SourceType::BigInt => "BIGINT",
            SourceType::Real => "REAL",
            SourceType::DoublePrecision => "DOUBLE PRECISION",
            SourceType::Text => "TEXT",
        }
    }

    pub fn target(self) -> TargetType {
        match self {
            SourceType::Integer | SourceType::BigInt => TargetType::Integer,
            SourceType::Real | SourceType::DoublePrecision => TargetType::Real,
            SourceType::Text => TargetType::Text,
        }
    }

    /// Resolve from the upper-cased type words of a column definition.
    ///
    /// Integer spellings win over bigint, bigint over double, double over
    /// real; anything unrecognised is stored as text.
    pub fn from_type_words(words: &[String]) -> Self {
        let has = |names: &[&str]| words.iter().any(|w| names.contains(&w.as_str()));

        if has(&[
            "INT",
            "INTEGER",
            "SERIAL",
            "INT2",
            "INT4",
            "SMALLINT",
            "SMALLSERIAL",
            "SERIAL2",
            "SERIAL4",
        ]) {
            SourceType::Integer
        } else if has(&["BIGINT", "INT8", "BIGSERIAL", "SERIAL8"]) {
            SourceType::BigInt
        } else if has(&["DOUBLE", "FLOAT8", "FLOAT"]) {
            SourceType::DoublePrecision
        } else if has(&["REAL", "FLOAT4"]) {
            SourceType::Real
        } else {
            SourceType::Text
        }
    }
}

/// SQLite storage type a column is created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetType {
    Integer,
    Real,
    Text,
}

impl TargetType {
    pub fn as_str(self) -> &'static str {
        match self {
            TargetType::Integer => "INTEGER",
            TargetType::Real => "REAL",
            TargetType::Text => "TEXT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDefinition {
    pub name: String,
    pub source_type: SourceType,
    pub target_type: TargetType,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub nullable: bool,
    pub unique: bool,
    pub default: Option<String>,
    /// CHECK, REFERENCES and generated-column clauses, as written.
    pub constraints: Vec<String>,
}

impl ColumnDefinition {
    fn to_sqlite(&self, inline_primary_key: bool) -> String {
        let mut out = format!(
            "{} {} {}",
            quote_identifier(&self.name),
            self.target_type.as_str(),
            if self.nullable { "NULL" } else { "NOT NULL" }
        );
        if self.primary_key && inline_primary_key {
            out.push_str(" PRIMARY KEY");
        }
        if self.unique {
            out.push_str(" UNIQUE");
        }
        if let Some(default) = &self.default {
            out.push_str(" DEFAULT ");
            out.push_str(&default_expression(default));
        }
        for constraint in &self.constraints {
            out.push(' ');
            out.push_str(constraint);
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTable {
    pub table: String,
    pub if_not_exists: bool,
    pub columns: Vec<ColumnDefinition>,
    /// Table constraints other than PRIMARY KEY, as written.
    pub constraints: Vec<String>,
}

impl CreateTable {
    /// Render the SQLite statement.
    ///
    /// A single primary-key column is declared inline; a composite key
    /// becomes a trailing `PRIMARY KEY (..)` constraint.
    pub fn to_sqlite(&self) -> String {
        let key_columns: Vec<&ColumnDefinition> =
            self.columns.iter().filter(|c| c.primary_key).collect();
        let inline = key_columns.len() == 1;

        let mut parts: Vec<String> = self.columns.iter().map(|c| c.to_sqlite(inline)).collect();
        if key_columns.len() > 1 {
            let names: Vec<Cow<'_, str>> =
                key_columns.iter().map(|c| quote_identifier(&c.name)).collect();
            parts.push(format!("PRIMARY KEY ({})", names.join(", ")));
        }
        parts.extend(self.constraints.iter().cloned());

        format!(
            "CREATE TABLE {}{} ( {} );",
            if self.if_not_exists { "IF NOT EXISTS " } else { "" },
            quote_identifier(&self.table),
            parts.join(", ")
        )
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }
}

/// Match `CREATE TABLE [IF NOT EXISTS] <name> ( <definitions> )`.
pub(super) fn parse(sql: &str, tokens: &[Token<'_>]) -> TranslateResult<CreateTable> {
    let at = skip_if_exists(tokens, 2);
    if at == 4 {
        return Err(TranslateError::malformed(KIND, "IF EXISTS is not allowed here"));
    }
    let if_not_exists = at == 5;

    let (table, open) = table_name(tokens, at)
        .ok_or_else(|| TranslateError::malformed(KIND, "missing table name"))?;
    if !tokens.get(open).is_some_and(|t| t.is_symbol('(')) {
        return Err(TranslateError::malformed(
            KIND,
            "could not find column definitions",
        ));
    }
    let close = skip_group(tokens, open, KIND)?;
    let body = &tokens[open + 1..close - 1];
    if body.is_empty() {
        return Err(TranslateError::malformed(KIND, "no column definitions"));
    }

    let mut columns = Vec::new();
    let mut explicit_nullability = Vec::new();
    let mut key_names = Vec::new();
    let mut constraints = Vec::new();

    for segment in split_top_level(body) {
        if segment.is_empty() {
            return Err(TranslateError::malformed(KIND, "empty column definition"));
        }
        if is_table_constraint(segment) {
            match primary_key_columns(segment)? {
                Some(names) => key_names.extend(names),
                None => constraints.push(span(sql, segment).to_string()),
            }
            continue;
        }
        let (column, explicit) = parse_column(sql, segment)?;
        columns.push(column);
        explicit_nullability.push(explicit);
    }

    for name in key_names {
        let index = columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(&name))
            .ok_or_else(|| {
                TranslateError::malformed(
                    KIND,
                    format!("primary key column \"{}\" is not defined", name),
                )
            })?;
        columns[index].primary_key = true;
        if explicit_nullability[index].is_none() {
            columns[index].nullable = false;
        }
    }

    Ok(CreateTable {
        table,
        if_not_exists,
        columns,
        constraints,
    })
}

fn is_table_constraint(segment: &[Token<'_>]) -> bool {
    let first = &segment[0];
    let second = segment.get(1);
    (first.is_keyword("PRIMARY") && second.is_some_and(|t| t.is_keyword("KEY")))
        || (first.is_keyword("FOREIGN") && second.is_some_and(|t| t.is_keyword("KEY")))
        || first.is_keyword("UNIQUE")
        || first.is_keyword("CONSTRAINT")
        || first.is_keyword("CHECK")
}

/// Column names of a `[CONSTRAINT name] PRIMARY KEY ( .. )` segment, or
/// `None` when the segment is some other table constraint.
fn primary_key_columns(segment: &[Token<'_>]) -> TranslateResult<Option<Vec<String>>> {
    let at = if segment[0].is_keyword("CONSTRAINT") { 2 } else { 0 };
    let is_key = segment.get(at).is_some_and(|t| t.is_keyword("PRIMARY"))
        && segment.get(at + 1).is_some_and(|t| t.is_keyword("KEY"));
    if !is_key {
        return Ok(None);
    }

    let open = at + 2;
    if !segment.get(open).is_some_and(|t| t.is_symbol('(')) {
        return Err(TranslateError::malformed(
            KIND,
            "PRIMARY KEY constraint needs a column list",
        ));
    }
    let close = skip_group(segment, open, KIND)?;

    let mut names = Vec::new();
    for part in split_top_level(&segment[open + 1..close - 1]) {
        match part.first() {
            Some(token) if token.is_identifier() => names.push(token.identifier_value()),
            _ => {
                return Err(TranslateError::malformed(
                    KIND,
                    "bad PRIMARY KEY column list",
                ))
            }
        }
    }
    Ok(Some(names))
}

/// Parse one column segment. The second value is the explicit nullability,
/// if a NULL or NOT NULL token was present.
fn parse_column(
    sql: &str,
    segment: &[Token<'_>],
) -> TranslateResult<(ColumnDefinition, Option<bool>)> {
    let name_token = &segment[0];
    if !name_token.is_identifier() {
        return Err(TranslateError::malformed(
            KIND,
            format!("expected a column name, found \"{}\"", name_token.text),
        ));
    }

    let mut type_words: Vec<String> = Vec::new();
    let mut not_null = false;
    let mut explicit_null = false;
    let mut primary_key = false;
    let mut unique = false;
    let mut auto_increment = false;
    let mut default = None;
    let mut constraints = Vec::new();

    let mut i = 1;
    while i < segment.len() {
        let token = &segment[i];
        if token.is_symbol('(') {
            // Type arguments such as VARCHAR(255) or NUMERIC(10, 2).
            i = skip_group(segment, i, KIND)?;
            continue;
        }
        if token.kind != TokenKind::Word {
            i += 1;
            continue;
        }

        match token.upper().as_str() {
            "NOT" => {
                if !segment.get(i + 1).is_some_and(|t| t.is_keyword("NULL")) {
                    return Err(TranslateError::malformed(KIND, "expected NULL after NOT"));
                }
                not_null = true;
                i += 2;
            }
            "NULL" => {
                explicit_null = true;
                i += 1;
            }
            "PRIMARY" => {
                if !segment.get(i + 1).is_some_and(|t| t.is_keyword("KEY")) {
                    return Err(TranslateError::malformed(KIND, "expected KEY after PRIMARY"));
                }
                primary_key = true;
                i += 2;
            }
            "UNIQUE" => {
                unique = true;
                i += 1;
            }
            "DEFAULT" => {
                let end = clause_end(segment, i + 1)?;
                if end == i + 1 {
                    return Err(TranslateError::malformed(KIND, "missing DEFAULT expression"));
                }
                default = Some(span(sql, &segment[i + 1..end]).to_string());
                i = end;
            }
            "CHECK" | "REFERENCES" => {
                let end = clause_end(segment, i + 1)?;
                if end == i + 1 {
                    return Err(TranslateError::malformed(
                        KIND,
                        format!("incomplete {} clause", token.upper()),
                    ));
                }
                constraints.push(span(sql, &segment[i..end]).to_string());
                i = end;
            }
            "GENERATED" => {
                let end = clause_end(segment, i + 1)?;
                if segment[i + 1..end].iter().any(|t| t.is_keyword("IDENTITY")) {
                    auto_increment = true;
                } else {
                    constraints.push(span(sql, &segment[i..end]).to_string());
                }
                i = end;
            }
            // Constraint names and collations have no SQLite counterpart we keep.
            "CONSTRAINT" | "COLLATE" => i += 2,
            word => {
                type_words.push(word.to_string());
                i += 1;
            }
        }
    }

    if type_words.iter().any(|w| SERIAL_TYPES.contains(&w.as_str())) {
        auto_increment = true;
    }

    let source_type = SourceType::from_type_words(&type_words);
    let explicit = if not_null {
        Some(false)
    } else if explicit_null {
        Some(true)
    } else {
        None
    };

    let column = ColumnDefinition {
        name: name_token.identifier_value(),
        source_type,
        target_type: source_type.target(),
        primary_key,
        auto_increment,
        nullable: explicit.unwrap_or(!primary_key),
        unique,
        default,
        constraints,
    };
    Ok((column, explicit))
}

/// End of a clause that starts at `from`: the next top-level column keyword.
///
/// The first token always belongs to the clause (so `DEFAULT NULL` keeps its
/// NULL), and `SET NULL` / `SET DEFAULT` inside referential actions do not
/// end it.
fn clause_end(tokens: &[Token<'_>], from: usize) -> TranslateResult<usize> {
    let mut i = from;
    while i < tokens.len() {
        let token = &tokens[i];
        let after_set = i > 0 && tokens[i - 1].is_keyword("SET");
        if i > from && !after_set && is_column_keyword(token) {
            break;
        }
        i = if token.is_symbol('(') {
            skip_group(tokens, i, KIND)?
        } else {
            i + 1
        };
    }
    Ok(i)
}

fn is_column_keyword(token: &Token<'_>) -> bool {
    token.kind == TokenKind::Word
        && COLUMN_KEYWORDS
            .iter()
            .any(|kw| token.text.eq_ignore_ascii_case(kw))
}

/// SQLite only accepts literals bare after DEFAULT; anything else has to be
/// parenthesized.
fn default_expression(expr: &str) -> Cow<'_, str> {
    let Ok(tokens) = tokenize(expr) else {
        return Cow::Owned(format!("({})", expr));
    };

    let literal = match tokens.as_slice() {
        [t] => {
            matches!(t.kind, TokenKind::Number | TokenKind::String)
                || ["NULL", "TRUE", "FALSE", "CURRENT_TIMESTAMP", "CURRENT_DATE", "CURRENT_TIME"]
                    .iter()
                    .any(|kw| t.is_keyword(kw))
        }
        [sign, n] => (sign.is_symbol('-') || sign.is_symbol('+')) && n.kind == TokenKind::Number,
        [first, ..] => first.is_symbol('(') && skip_group(&tokens, 0, KIND).ok() == Some(tokens.len()),
        [] => false,
    };

    if literal {
        Cow::Borrowed(expr)
    } else {
        Cow::Owned(format!("({})", expr))
    }
}

/// Quote an identifier unless it is a plain word.
fn quote_identifier(name: &str) -> Cow<'_, str> {
    let plain = name
        .chars()
        .next()
        .is_some_and(|c| c == '_' || c.is_ascii_alphabetic())
        && name.chars().all(|c| c == '_' || c.is_ascii_alphanumeric());
    if plain {
        Cow::Borrowed(name)
    } else {
        Cow::Owned(format!("\"{}\"", name.replace('"', "\"\"")))
    }
}
