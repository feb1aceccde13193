//! Statement normalization and tokenization.
//!
//! Tokens borrow from the normalized text and remember their byte span, so
//! recognizers can lift any run of tokens back out verbatim.

use super::error::{TranslateError, TranslateResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Bare identifier or keyword.
    Word,
    /// `"double quoted"` identifier, quotes included in the text.
    QuotedIdent,
    /// `'single quoted'` literal, quotes included in the text.
    String,
    Number,
    /// Any other single character: `(`, `)`, `,`, `=`, `*`, ...
    Symbol,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    pub start: usize,
    pub end: usize,
}

impl<'a> Token<'a> {
    /// Case-insensitive keyword check. Quoted identifiers never match.
    #[inline]
    pub fn is_keyword(&self, keyword: &str) -> bool {
        self.kind == TokenKind::Word && self.text.eq_ignore_ascii_case(keyword)
    }

    #[inline]
    pub fn is_symbol(&self, c: char) -> bool {
        self.kind == TokenKind::Symbol && self.text.len() == c.len_utf8() && self.text.starts_with(c)
    }

    pub fn is_identifier(&self) -> bool {
        matches!(self.kind, TokenKind::Word | TokenKind::QuotedIdent)
    }

    /// Identifier value: quotes stripped and `""` unescaped for quoted
    /// identifiers, text as written otherwise.
    pub fn identifier_value(&self) -> String {
        match self.kind {
            TokenKind::QuotedIdent => self.text[1..self.text.len() - 1].replace("\"\"", "\""),
            _ => self.text.to_string(),
        }
    }

    pub fn upper(&self) -> String {
        self.text.to_ascii_uppercase()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Scan {
    Normal,
    SingleQuote,
    DoubleQuote,
    LineComment,
    BlockComment,
}

/// Collapse whitespace runs to one space, trim, and drop one trailing
/// semicolon.
///
/// Whitespace inside quoted literals and identifiers is kept. Comments are
/// replaced by whitespace, so a `--` comment cannot swallow the rest of the
/// statement once newlines are gone.
pub fn normalize(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut state = Scan::Normal;
    let mut pending_space = false;
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match state {
            Scan::Normal => {
                if c.is_whitespace() {
                    pending_space = true;
                    continue;
                }
                if c == '-' && chars.peek() == Some(&'-') {
                    chars.next();
                    state = Scan::LineComment;
                    pending_space = true;
                    continue;
                }
                if c == '/' && chars.peek() == Some(&'*') {
                    chars.next();
                    state = Scan::BlockComment;
                    pending_space = true;
                    continue;
                }
                if pending_space && !out.is_empty() {
                    out.push(' ');
                }
                pending_space = false;
                out.push(c);
                match c {
                    '\'' => state = Scan::SingleQuote,
                    '"' => state = Scan::DoubleQuote,
                    _ => {}
                }
            }
            Scan::SingleQuote => {
                out.push(c);
                if c == '\'' {
                    state = Scan::Normal;
                }
            }
            Scan::DoubleQuote => {
                out.push(c);
                if c == '"' {
                    state = Scan::Normal;
                }
            }
            Scan::LineComment => {
                if c == '\n' {
                    state = Scan::Normal;
                }
            }
            Scan::BlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    state = Scan::Normal;
                }
            }
        }
    }

    if let Some(stripped) = out.strip_suffix(';') {
        out.truncate(stripped.trim_end().len());
    }
    out
}

/// Split normalized text into tokens.
pub fn tokenize(sql: &str) -> TranslateResult<Vec<Token<'_>>> {
    let bytes = sql.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];

        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        let start = i;
        let kind = match c {
            b'\'' | b'"' => {
                i = scan_quoted(bytes, i, c).ok_or_else(|| {
                    TranslateError::malformed(
                        "statement",
                        format!("unterminated quoted text starting at byte {}", start),
                    )
                })?;
                if c == b'\'' {
                    TokenKind::String
                } else {
                    TokenKind::QuotedIdent
                }
            }
            b'0'..=b'9' => {
                i += 1;
                while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                    i += 1;
                }
                TokenKind::Number
            }
            c if c == b'_' || c.is_ascii_alphabetic() || c >= 0x80 => {
                i += 1;
                while i < bytes.len()
                    && (bytes[i] == b'_'
                        || bytes[i] == b'$'
                        || bytes[i].is_ascii_alphanumeric()
                        || bytes[i] >= 0x80)
                {
                    i += 1;
                }
                TokenKind::Word
            }
            _ => {
                // Advance over one full character.
                i += sql[i..].chars().next().map_or(1, char::len_utf8);
                TokenKind::Symbol
            }
        };

        tokens.push(Token {
            kind,
            text: &sql[start..i],
            start,
            end: i,
        });
    }

    Ok(tokens)
}

/// Index just past the closing quote, treating a doubled quote as an escape.
fn scan_quoted(bytes: &[u8], start: usize, quote: u8) -> Option<usize> {
    let mut i = start + 1;
    while i < bytes.len() {
        if bytes[i] == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return Some(i + 1);
        }
        i += 1;
    }
    None
}

// ============================================================================
// Token slice helpers
// ============================================================================

/// Index just past the parenthesis that closes the one at `open`.
pub fn skip_group(tokens: &[Token<'_>], open: usize, kind: &'static str) -> TranslateResult<usize> {
    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate().skip(open) {
        if token.is_symbol('(') {
            depth += 1;
        } else if token.is_symbol(')') {
            depth = depth.saturating_sub(1);
            if depth == 0 {
                return Ok(i + 1);
            }
        }
    }
    Err(TranslateError::malformed(kind, "unbalanced parentheses"))
}

/// Split a token run on commas that are not nested inside parentheses.
pub fn split_top_level<'t, 'a>(tokens: &'t [Token<'a>]) -> Vec<&'t [Token<'a>]> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut from = 0;

    for (i, token) in tokens.iter().enumerate() {
        if token.is_symbol('(') {
            depth += 1;
        } else if token.is_symbol(')') {
            depth = depth.saturating_sub(1);
        } else if depth == 0 && token.is_symbol(',') {
            parts.push(&tokens[from..i]);
            from = i + 1;
        }
    }
    parts.push(&tokens[from..]);
    parts
}

/// Source text covered by a non-empty token run.
pub fn span<'a>(sql: &'a str, tokens: &[Token<'_>]) -> &'a str {
    match (tokens.first(), tokens.last()) {
        (Some(first), Some(last)) => &sql[first.start..last.end],
        _ => "",
    }
}

/// Index of the first `keyword` at or after `from` that is not nested inside
/// parentheses.
pub fn find_top_level(tokens: &[Token<'_>], from: usize, keyword: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate().skip(from) {
        if token.is_symbol('(') {
            depth += 1;
        } else if token.is_symbol(')') {
            depth = depth.saturating_sub(1);
        } else if depth == 0 && token.is_keyword(keyword) {
            return Some(i);
        }
    }
    None
}
