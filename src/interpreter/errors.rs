//! Execution Errors
//!
//! Runtime failures and the control-flow signals that travel the same path:
//! - break / continue: leave or restart loops
//! - return: leave the running function or sourced file
//! - exit: terminate the script (or the enclosing Ox subshell)
//! - broken pipe: the reader of this stage's stdout went away
//!
//! Every failure carries the span of the node that raised it so it can be
//! rendered by the diagnostic engine.

use std::sync::Arc;

use thiserror::Error;

use crate::ast::types::Span;
use crate::diagnostic::Diagnostic;
use crate::interpreter::types::SourceFile;
use crate::interpreter::value::ValueError;

/// Exit status for runtime failures
pub const EXIT_FAILURE: i32 = 1;
/// Exit status for syntax errors
pub const EXIT_SYNTAX: i32 = 2;
/// Exit status when a program exists but cannot be started
pub const EXIT_CANNOT_EXECUTE: i32 = 126;
/// Exit status when a command or interpreter is not found
pub const EXIT_NOT_FOUND: i32 = 127;
/// Exit status of a stage whose reader closed the pipe (128 + SIGPIPE)
pub const EXIT_BROKEN_PIPE: i32 = 128 + libc::SIGPIPE;
/// Nesting limit for function calls and `source`
pub const MAX_CALL_DEPTH: u32 = 64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecError {
    #[error("Type mismatch: {message}")]
    TypeMismatch { message: String, span: Span },

    #[error("Arithmetic error: {message}")]
    Arithmetic { message: String, span: Span },

    #[error("Unbound variable `{name}`")]
    UnboundVariable { name: String, span: Span },

    #[error("Interpreter `{interpreter}` not found")]
    InterpreterNotFound { interpreter: String, span: Span },

    #[error("Failed to start `{program}`: {reason}")]
    ProcessSpawn {
        program: String,
        reason: String,
        span: Span,
    },

    #[error("Command not found: `{name}`")]
    CommandNotFound { name: String, span: Span },

    #[error("{message}")]
    Io { message: String, span: Span },

    #[error("`{name}`: maximum recursion depth ({}) exceeded", MAX_CALL_DEPTH)]
    CallDepth { name: String, span: Span },

    /// An error raised by code read from another source text; `None`, or a
    /// file without a name, is shell input
    #[error("{}{}", file_prefix(.file), .error)]
    Located {
        file: Option<Arc<SourceFile>>,
        error: Box<ExecError>,
    },

    #[error("break")]
    Break { levels: u32 },

    #[error("continue")]
    Continue { levels: u32 },

    #[error("return {code}")]
    Return { code: i32 },

    #[error("exit {code}")]
    Exit { code: i32 },

    #[error("broken pipe")]
    BrokenPipe,
}

impl ExecError {
    /// Attach a span to a value-level failure
    pub fn from_value(err: ValueError, span: Span) -> Self {
        match err {
            ValueError::TypeMismatch(message) => ExecError::TypeMismatch { message, span },
            ValueError::Arithmetic(message) => ExecError::Arithmetic { message, span },
        }
    }

    pub fn io(err: &std::io::Error, context: &str, span: Span) -> Self {
        ExecError::Io {
            message: format!("{}: {}", context, err),
            span,
        }
    }

    pub fn span(&self) -> Option<Span> {
        match self {
            ExecError::TypeMismatch { span, .. }
            | ExecError::Arithmetic { span, .. }
            | ExecError::UnboundVariable { span, .. }
            | ExecError::InterpreterNotFound { span, .. }
            | ExecError::ProcessSpawn { span, .. }
            | ExecError::CommandNotFound { span, .. }
            | ExecError::Io { span, .. }
            | ExecError::CallDepth { span, .. } => Some(*span),
            ExecError::Located { .. }
            | ExecError::Break { .. }
            | ExecError::Continue { .. }
            | ExecError::Return { .. }
            | ExecError::Exit { .. }
            | ExecError::BrokenPipe => None,
        }
    }

    /// Exit status recorded when this error aborts a statement
    pub fn exit_code(&self) -> i32 {
        match self {
            ExecError::InterpreterNotFound { .. } | ExecError::CommandNotFound { .. } => EXIT_NOT_FOUND,
            ExecError::ProcessSpawn { .. } => EXIT_CANNOT_EXECUTE,
            ExecError::Exit { code } | ExecError::Return { code } => *code,
            ExecError::BrokenPipe => EXIT_BROKEN_PIPE,
            ExecError::Located { error, .. } => error.exit_code(),
            ExecError::Break { .. } | ExecError::Continue { .. } => 0,
            _ => EXIT_FAILURE,
        }
    }

    pub fn is_control_flow(&self) -> bool {
        matches!(
            self,
            ExecError::Break { .. }
                | ExecError::Continue { .. }
                | ExecError::Return { .. }
                | ExecError::Exit { .. }
                | ExecError::BrokenPipe
        )
    }

    /// Tie an error to the text it was raised from, unless it already is
    pub fn located(self, file: Option<Arc<SourceFile>>) -> Self {
        if self.span().is_none() {
            return self;
        }
        ExecError::Located {
            file,
            error: Box::new(self),
        }
    }

    /// Render against `source`, or against the file the error came from
    pub fn to_diagnostic(&self, source: &str) -> Option<Diagnostic> {
        match self {
            ExecError::Located { file, error } => {
                let mut diagnostic = error.to_diagnostic(file.as_ref().map_or(source, |f| f.text.as_str()))?;
                diagnostic.message = self.to_string();
                Some(diagnostic)
            }
            _ => self
                .span()
                .map(|span| Diagnostic::new(self.to_string(), span, source)),
        }
    }
}

fn file_prefix(file: &Option<Arc<SourceFile>>) -> String {
    match file {
        Some(f) if !f.name.is_empty() => format!("{}: ", f.name),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let span = Span::new(1, 1, 0, 1);
        assert_eq!(
            ExecError::CommandNotFound { name: "x".into(), span }.exit_code(),
            EXIT_NOT_FOUND
        );
        assert_eq!(
            ExecError::ProcessSpawn { program: "x".into(), reason: "denied".into(), span }.exit_code(),
            EXIT_CANNOT_EXECUTE
        );
        assert_eq!(ExecError::Exit { code: 3 }.exit_code(), 3);
        assert_eq!(
            ExecError::Arithmetic { message: "m".into(), span }.exit_code(),
            EXIT_FAILURE
        );
    }

    #[test]
    fn test_from_value_keeps_kind() {
        let span = Span::new(2, 4, 10, 3);
        let err = ExecError::from_value(ValueError::Arithmetic("division by zero".into()), span);
        assert_eq!(err.to_string(), "Arithmetic error: division by zero");
        assert_eq!(err.span(), Some(span));
    }

    #[test]
    fn test_control_flow_has_no_diagnostic() {
        assert!(ExecError::Break { levels: 1 }.to_diagnostic("x").is_none());
        assert!(ExecError::Exit { code: 0 }.is_control_flow());
        assert!(ExecError::BrokenPipe.to_diagnostic("x").is_none());
        assert_eq!(ExecError::BrokenPipe.exit_code(), 141);
    }

    #[test]
    fn test_located_error_renders_against_its_file() {
        let file = Arc::new(SourceFile {
            name: "lib.ox".into(),
            text: "echo ok\nint n=\"x\"\n".into(),
        });
        let inner = ExecError::TypeMismatch {
            message: "bad".into(),
            span: Span::new(2, 7, 14, 3),
        };
        let err = inner.located(Some(file));
        assert_eq!(err.exit_code(), EXIT_FAILURE);
        assert_eq!(err.span(), None);
        let diagnostic = err.to_diagnostic("unrelated shell input").unwrap();
        assert_eq!(diagnostic.message, "lib.ox: Type mismatch: bad");
        assert_eq!(diagnostic.source_line, "int n=\"x\"");
    }

    #[test]
    fn test_located_without_file_uses_shell_input() {
        let inner = ExecError::CallDepth {
            name: "f".into(),
            span: Span::new(1, 1, 0, 1),
        };
        let diagnostic = inner.located(None).to_diagnostic("f").unwrap();
        assert_eq!(diagnostic.message, "`f`: maximum recursion depth (64) exceeded");
        assert_eq!(diagnostic.source_line, "f");
    }

    #[test]
    fn test_return_is_control_flow() {
        let ret = ExecError::Return { code: 4 };
        assert!(ret.is_control_flow());
        assert_eq!(ret.exit_code(), 4);
        assert_eq!(ret.clone().located(None), ret);
    }
}
