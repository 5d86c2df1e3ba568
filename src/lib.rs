//! ox - a typed shell with multi-interpreter subshells
//!
//! This library provides the lexer and parser for Ox scripts, a
//! caret-annotated diagnostic renderer, an execution engine that dispatches
//! processes and shebang subshells, and the prompt template expander.

pub mod ast;
pub mod diagnostic;
pub mod interpreter;
pub mod parser;
pub mod prompt;
pub mod shell;

pub use ast::types::*;
pub use diagnostic::{report, Diagnostic};
pub use interpreter::{Environment, ExecError, ExecResult, Interpreter, Value};
pub use parser::{parse, tokenize, ParseException, Parser, SyntaxError};
pub use shell::{Shell, ShellOptions};
