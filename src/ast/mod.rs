//! Abstract Syntax Tree (AST) Types for Ox
//!
//! Architecture:
//!   Input → Lexer → Parser → AST → Interpreter → Exit status / output

pub mod types;
