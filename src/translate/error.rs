//! Translation errors.

use thiserror::Error;

use crate::pg::SqlState;

pub type TranslateResult<T> = Result<T, TranslateError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TranslateError {
    #[error("Unsupported statement: {0}")]
    UnsupportedStatement(String),

    #[error("Malformed {kind} statement: {reason}")]
    MalformedStatement { kind: &'static str, reason: String },
}

impl TranslateError {
    pub fn malformed(kind: &'static str, reason: impl Into<String>) -> Self {
        TranslateError::MalformedStatement {
            kind,
            reason: reason.into(),
        }
    }

    pub fn sql_state(&self) -> SqlState {
        match self {
            TranslateError::UnsupportedStatement(_) => SqlState::FEATURE_NOT_SUPPORTED,
            TranslateError::MalformedStatement { .. } => SqlState::SYNTAX_ERROR,
        }
    }
}
