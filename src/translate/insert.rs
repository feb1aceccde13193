//! INSERT recognition.
//!
//! The statement is forwarded unchanged; this only checks its shape and pulls
//! out what the session needs to answer it.

use super::error::{TranslateError, TranslateResult};
use super::lexer::{find_top_level, skip_group, span, split_top_level, Token};
use super::table_name;

const KIND: &str = "INSERT";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Insert {
    pub table: String,
    /// Explicit column list; empty when omitted.
    pub columns: Vec<String>,
    /// Inner text of each VALUES row. Empty for `DEFAULT VALUES`.
    pub values: Vec<String>,
    /// RETURNING items as written.
    pub returning: Option<Vec<String>>,
}

/// Match `INSERT INTO <name> [( cols )] VALUES ( .. ) [, ( .. )]* [..] [RETURNING ..]`.
pub(super) fn parse(sql: &str, tokens: &[Token<'_>]) -> TranslateResult<Insert> {
    if !tokens.get(1).is_some_and(|t| t.is_keyword("INTO")) {
        return Err(TranslateError::malformed(KIND, "expected INTO"));
    }

    let (table, mut i) = table_name(tokens, 2)
        .ok_or_else(|| TranslateError::malformed(KIND, "missing table name"))?;
    if tokens.get(i).is_some_and(|t| t.is_keyword("AS")) {
        i += 2;
    }

    let mut columns = Vec::new();
    if tokens.get(i).is_some_and(|t| t.is_symbol('(')) {
        let close = skip_group(tokens, i, KIND)?;
        for part in split_top_level(&tokens[i + 1..close - 1]) {
            match part {
                [name] if name.is_identifier() => columns.push(name.identifier_value()),
                _ => return Err(TranslateError::malformed(KIND, "bad column list")),
            }
        }
        i = close;
    }

    let mut values = Vec::new();
    let is = |at: usize, kw: &str| tokens.get(at).is_some_and(|t| t.is_keyword(kw));
    if is(i, "DEFAULT") && is(i + 1, "VALUES") {
        i += 2;
    } else if is(i, "VALUES") {
        i += 1;
        loop {
            if !tokens.get(i).is_some_and(|t| t.is_symbol('(')) {
                return Err(TranslateError::malformed(
                    KIND,
                    "expected a parenthesized VALUES row",
                ));
            }
            let close = skip_group(tokens, i, KIND)?;
            values.push(span(sql, &tokens[i + 1..close - 1]).to_string());
            i = close;

            if tokens.get(i).is_some_and(|t| t.is_symbol(',')) {
                i += 1;
            } else {
                break;
            }
        }
    } else {
        return Err(TranslateError::malformed(KIND, "could not find VALUES"));
    }

    let returning = match find_top_level(tokens, i, "RETURNING") {
        Some(at) => {
            let items: Vec<String> = split_top_level(&tokens[at + 1..])
                .into_iter()
                .filter(|item| !item.is_empty())
                .map(|item| span(sql, item).to_string())
                .collect();
            if items.is_empty() {
                return Err(TranslateError::malformed(KIND, "RETURNING needs at least one item"));
            }
            Some(items)
        }
        None => None,
    };

    Ok(Insert {
        table,
        columns,
        values,
        returning,
    })
}
