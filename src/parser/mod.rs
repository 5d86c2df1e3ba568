//! Parser module for Ox scripts
//!
//! This module contains the lexer and parser for Ox scripts.

pub mod types;
pub mod lexer;
pub mod word_parser;
pub mod expression_parser;
pub mod compound_parser;
pub mod parser;

// Re-exports
pub use types::{ParseException, SyntaxError, SyntaxErrorKind};
pub use lexer::{tokenize, Lexer, LexerError, Token, TokenType};
pub use parser::{parse, parse_tokens, Parser};
