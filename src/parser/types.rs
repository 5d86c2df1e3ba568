//! Parser Types and Constants
//!
//! Shared error types and limits used across parser modules.

use std::fmt;
use thiserror::Error;

use crate::ast::types::Span;
use crate::diagnostic::Diagnostic;
use crate::parser::lexer::{LexerError, TokenType};

// Parser limits to prevent hangs and resource exhaustion
pub const MAX_INPUT_SIZE: usize = 1_000_000; // 1MB max input
pub const MAX_PARSER_DEPTH: usize = 200; // Max recursion depth for nested constructs

/// Check if a token type is a redirection token
pub fn is_redirection_token(t: TokenType) -> bool {
    matches!(
        t,
        TokenType::Less
            | TokenType::Great
            | TokenType::DGreat
            | TokenType::ErrGreat
            | TokenType::ErrDGreat
    )
}

/// Which family a syntax error belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntaxErrorKind {
    /// Malformed token
    Lex,
    /// Structural grammar violation
    Grammar,
    /// Value statically incompatible with its declared type
    TypeMismatch,
}

/// A positioned parse-time error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct SyntaxError {
    pub message: String,
    pub span: Span,
    pub kind: SyntaxErrorKind,
    /// Input ended inside an open construct; more text may complete it
    pub incomplete: bool,
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};{} - {}", self.span.line, self.span.column, self.message)
    }
}

impl SyntaxError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
            kind: SyntaxErrorKind::Grammar,
            incomplete: false,
        }
    }

    pub fn incomplete(message: impl Into<String>, span: Span) -> Self {
        Self {
            incomplete: true,
            ..Self::new(message, span)
        }
    }

    pub fn type_mismatch(message: impl Into<String>, span: Span) -> Self {
        Self {
            kind: SyntaxErrorKind::TypeMismatch,
            ..Self::new(message, span)
        }
    }

    pub fn to_diagnostic(&self, source: &str) -> Diagnostic {
        Diagnostic::new(self.message.clone(), self.span, source)
    }
}

impl From<LexerError> for SyntaxError {
    fn from(err: LexerError) -> Self {
        Self {
            message: err.message,
            span: err.span,
            kind: SyntaxErrorKind::Lex,
            incomplete: err.incomplete,
        }
    }
}

/// Every error collected while parsing one input.
#[derive(Debug, Clone, Error)]
pub struct ParseException {
    pub errors: Vec<SyntaxError>,
}

impl fmt::Display for ParseException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.errors.first() {
            Some(first) if self.errors.len() > 1 => {
                write!(f, "{} (and {} more)", first, self.errors.len() - 1)
            }
            Some(first) => write!(f, "{}", first),
            None => write!(f, "parse failed"),
        }
    }
}

impl ParseException {
    pub fn new(errors: Vec<SyntaxError>) -> Self {
        Self { errors }
    }

    pub fn first(&self) -> Option<&SyntaxError> {
        self.errors.first()
    }

    /// True when the only problem is that input ended too early.
    pub fn is_incomplete(&self) -> bool {
        !self.errors.is_empty() && self.errors.iter().all(|e| e.incomplete)
    }

    /// Render every collected error as a diagnostic report.
    pub fn render(&self, source: &str) -> String {
        self.errors
            .iter()
            .map(|e| e.to_diagnostic(source).render())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
