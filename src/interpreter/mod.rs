//! Interpreter module
//!
//! Typed values, the scoped environment and the execution engine that walks
//! the AST and dispatches processes.

pub mod arithmetic;
pub mod builtin_dispatch;
pub mod command_resolution;
pub mod control_flow;
pub mod environment;
pub mod errors;
pub mod execution_engine;
pub mod functions;
pub mod pipeline_execution;
pub mod process;
pub mod pattern;
pub mod redirections;
pub mod streams;
pub mod subshell_group;
pub mod types;
pub mod value;
pub mod word_expansion;

pub use builtin_dispatch::{is_builtin, SHELL_BUILTINS};
pub use command_resolution::{resolve_executable, Resolution, DEFAULT_PATH};
pub use environment::{Binding, Environment};
pub use errors::*;
pub use execution_engine::Interpreter;
pub use process::{ProcessHandle, ProcessOutcome, ScriptFd};
pub use streams::{InputSource, OutputSink};
pub use types::{ExecResult, OutputBuffer, PipelineStatus, SourceFile};
pub use value::{Value, ValueError};
