//! Execution Engine
//!
//! The core execution engine that ties all interpreter components together.
//! Implements the full AST execution chain:
//!
//! execute -> execute_statement -> execute_pipeline -> execute_command
//!
//! An interpreter owns its three standard streams. Statements run on the
//! calling thread; inside a pipeline every in-process stage except the last
//! runs on its own thread with a forked interpreter (see
//! `pipeline_execution`).

use std::collections::HashMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::ast::types::{
    AssignmentNode, CommandNode, ScriptNode, SimpleCommandNode, StatementNode,
    StatementOperator, SubshellBody,
};
use crate::interpreter::environment::Environment;
use crate::interpreter::errors::{ExecError, EXIT_BROKEN_PIPE};
use crate::interpreter::functions::DefinedFunction;
use crate::interpreter::streams::{InputSource, OutputSink};
use crate::interpreter::types::{OutputBuffer, SourceFile};
use crate::interpreter::value::Value;

/// Live interpreter state, passed explicitly instead of living in globals.
#[derive(Debug)]
pub struct Interpreter {
    pub env: Environment,
    pub cwd: PathBuf,
    /// Status of the last completed pipeline, `$?`
    pub last_exit: i32,
    /// Statuses of every stage of the last pipeline
    pub pipestatus: Vec<i32>,
    /// Functions defined so far, by name
    pub(crate) functions: HashMap<String, Arc<DefinedFunction>>,
    /// Text of the code now running; None until a shell sets one
    pub(crate) origin: Option<Arc<SourceFile>>,
    pub(crate) stdin: InputSource,
    pub(crate) stdout: OutputSink,
    pub(crate) stderr: OutputSink,
    /// Everything written to a `Capture` sink
    pub(crate) output: OutputBuffer,
    /// Last stdout write left a line unterminated
    pub(crate) line_open: bool,
    pub(crate) loop_depth: u32,
    /// Function calls and sourced files currently running
    pub(crate) call_depth: u32,
}

impl Interpreter {
    pub fn new(env: Environment, cwd: PathBuf) -> Self {
        Self {
            env,
            cwd,
            last_exit: 0,
            pipestatus: Vec::new(),
            functions: HashMap::new(),
            origin: None,
            stdin: InputSource::Inherit,
            stdout: OutputSink::Inherit,
            stderr: OutputSink::Inherit,
            output: OutputBuffer::default(),
            line_open: false,
            loop_depth: 0,
            call_depth: 0,
        }
    }

    /// Collect all output in memory until `take_output`.
    ///
    /// A capturing interpreter gives spawned programs an empty stdin.
    pub fn set_capture(&mut self, capture: bool) {
        if capture {
            self.stdin = InputSource::Null;
            self.stdout = OutputSink::Capture;
            self.stderr = OutputSink::Capture;
        } else {
            self.stdin = InputSource::Inherit;
            self.stdout = OutputSink::Inherit;
            self.stderr = OutputSink::Inherit;
        }
    }

    /// Drain captured output
    pub fn take_output(&mut self) -> OutputBuffer {
        self.line_open = false;
        std::mem::take(&mut self.output)
    }

    /// True when stdout last received text without a trailing newline
    pub fn stdout_line_open(&self) -> bool {
        self.line_open
    }

    /// Name the source text that following statements were parsed from
    pub fn set_origin(&mut self, name: impl Into<String>, text: impl Into<String>) {
        self.origin = Some(Arc::new(SourceFile {
            name: name.into(),
            text: text.into(),
        }));
    }

    /// Bind `$1`..`$9` and `$#` in the current scope
    pub fn set_positional(&mut self, args: &[String]) {
        for (i, arg) in args.iter().take(9).enumerate() {
            self.env.set_local(&(i + 1).to_string(), Value::Str(arg.clone()));
        }
        let count = i32::try_from(args.len()).unwrap_or(i32::MAX);
        self.env.set_local("#", Value::Int(count));
    }

    // =========================================================================
    // OUTPUT
    // =========================================================================

    /// Write to stdout; fails only when the reading end has gone away.
    pub(crate) fn write_stdout(&mut self, bytes: &[u8]) -> Result<(), ExecError> {
        if let (Some(&last), OutputSink::Capture | OutputSink::Inherit) = (bytes.last(), &self.stdout) {
            self.line_open = last != b'\n';
        }
        let written = match &mut self.stdout {
            OutputSink::Capture => {
                self.output.stdout.extend_from_slice(bytes);
                Ok(())
            }
            OutputSink::Inherit => {
                let mut out = io::stdout().lock();
                out.write_all(bytes).and_then(|()| out.flush())
            }
            OutputSink::File(file) => file.write_all(bytes),
        };
        match written {
            Err(err) if err.kind() == io::ErrorKind::BrokenPipe => Err(ExecError::BrokenPipe),
            Err(err) => {
                warn!(%err, "failed to write stdout");
                Ok(())
            }
            Ok(()) => Ok(()),
        }
    }

    pub(crate) fn write_stderr(&mut self, bytes: &[u8]) {
        let written = match &mut self.stderr {
            OutputSink::Capture => {
                self.output.stderr.extend_from_slice(bytes);
                Ok(())
            }
            OutputSink::Inherit => {
                let mut err = io::stderr().lock();
                err.write_all(bytes).and_then(|()| err.flush())
            }
            OutputSink::File(file) => file.write_all(bytes),
        };
        if let Err(err) = written {
            debug!(%err, "stderr write dropped");
        }
    }

    /// Run `f` with some standard streams replaced.
    ///
    /// The replacements are dropped when `f` returns, which closes any pipe
    /// ends they hold.
    pub(crate) fn with_streams<T>(
        &mut self,
        stdin: Option<InputSource>,
        stdout: Option<OutputSink>,
        stderr: Option<OutputSink>,
        f: impl FnOnce(&mut Self) -> T,
    ) -> T {
        let saved_stdin = stdin.map(|s| std::mem::replace(&mut self.stdin, s));
        let saved_stdout = stdout.map(|s| std::mem::replace(&mut self.stdout, s));
        let saved_stderr = stderr.map(|s| std::mem::replace(&mut self.stderr, s));
        let result = f(self);
        if let Some(s) = saved_stdin {
            self.stdin = s;
        }
        if let Some(s) = saved_stdout {
            self.stdout = s;
        }
        if let Some(s) = saved_stderr {
            self.stderr = s;
        }
        result
    }

    /// Copy of this interpreter for a concurrent pipeline stage.
    ///
    /// The copy shares variables and functions by value; nothing it does
    /// flows back. Its stderr goes where ours does.
    pub(crate) fn fork_stage(&self, stdin: Option<InputSource>, stdout: OutputSink) -> io::Result<Interpreter> {
        let stdin = match stdin {
            Some(stdin) => stdin,
            None => self.stdin.try_clone()?,
        };
        Ok(Interpreter {
            env: self.env.clone(),
            cwd: self.cwd.clone(),
            last_exit: self.last_exit,
            pipestatus: self.pipestatus.clone(),
            functions: self.functions.clone(),
            origin: self.origin.clone(),
            stdin,
            stdout,
            stderr: self.stderr.try_clone()?,
            output: OutputBuffer::default(),
            line_open: false,
            loop_depth: 0,
            call_depth: self.call_depth,
        })
    }

    /// Run one command in a forked interpreter and hand back its status.
    ///
    /// Control flow ends here: `exit` sets the status and a closed reader
    /// yields 141. Dropping `self` closes this stage's pipe ends.
    pub(crate) fn run_forked(mut self, command: &CommandNode) -> ForkedOutcome {
        debug!(kind = command.kind_name(), "forked stage");
        let result = match self.execute_command(command) {
            Err(ExecError::Exit { code } | ExecError::Return { code }) => Ok(code),
            Err(ExecError::BrokenPipe) => Ok(EXIT_BROKEN_PIPE),
            Err(ExecError::Break { .. } | ExecError::Continue { .. }) => Ok(0),
            other => other,
        };
        ForkedOutcome {
            result,
            stderr: std::mem::take(&mut self.output.stderr),
        }
    }

    // =========================================================================
    // EXECUTION
    // =========================================================================

    /// Execute a complete script, stopping at the first error.
    pub fn execute(&mut self, script: &ScriptNode) -> Result<i32, ExecError> {
        self.execute_list(&script.statements)
    }

    /// Execute statements in order and return the last status.
    pub fn execute_list(&mut self, statements: &[StatementNode]) -> Result<i32, ExecError> {
        let mut status = 0;
        for statement in statements {
            status = self.execute_statement(statement)?;
        }
        Ok(status)
    }

    /// Execute a single statement (pipelines joined by && and ||).
    pub fn execute_statement(&mut self, statement: &StatementNode) -> Result<i32, ExecError> {
        let mut status = self.execute_pipeline(&statement.pipelines[0])?;
        for (operator, pipeline) in statement.operators.iter().zip(&statement.pipelines[1..]) {
            let run = match operator {
                StatementOperator::And => status == 0,
                StatementOperator::Or => status != 0,
            };
            if run {
                status = self.execute_pipeline(pipeline)?;
            }
        }
        Ok(status)
    }

    /// Run a command inside the current process.
    ///
    /// Simple commands reaching this point are functions or builtins. A
    /// foreign subshell is still a child process; it runs as a pipeline of
    /// one.
    pub(crate) fn execute_command(&mut self, command: &CommandNode) -> Result<i32, ExecError> {
        match command {
            CommandNode::Simple(node) => self.execute_simple_in_process(node),
            CommandNode::Assignment(node) => self.execute_assignment(node),
            CommandNode::Conditional(node) => self.execute_if(node),
            CommandNode::Loop(node) => self.execute_loop(node),
            CommandNode::Case(node) => self.execute_case(node),
            CommandNode::FunctionDef(node) => {
                self.define_function(node);
                Ok(0)
            }
            CommandNode::Subshell(node) => match &node.body {
                SubshellBody::Ox(script) => {
                    let args = self.expand_words(&node.args)?;
                    let redirections = &node.redirections;
                    self.with_redirections(redirections, |interp| interp.execute_ox_subshell(script, &args))
                }
                SubshellBody::Foreign(_) => self
                    .run_stages(std::slice::from_ref(command))
                    .map(|status| status.final_exit_code()),
            },
        }
    }

    fn execute_simple_in_process(&mut self, node: &SimpleCommandNode) -> Result<i32, ExecError> {
        let words = self.expand_words(&node.words)?;
        let Some((name, args)) = words.split_first() else {
            return Ok(0);
        };
        if let Some(function) = self.functions.get(name).cloned() {
            return self.with_redirections(&node.redirections, |interp| {
                interp.call_function(&function, args, node.span)
            });
        }
        self.with_redirections(&node.redirections, |interp| {
            interp
                .run_builtin(name, args, node.span)
                .unwrap_or(Err(ExecError::CommandNotFound {
                    name: name.clone(),
                    span: node.span,
                }))
        })
    }

    /// Evaluate the right-hand side, then bind; a failure leaves the old value.
    pub(crate) fn execute_assignment(&mut self, node: &AssignmentNode) -> Result<i32, ExecError> {
        let value = self.evaluate(&node.value)?;
        let stored = match node.declared {
            Some(declared) => self.env.declare(&node.name, declared, value),
            None => self.env.assign(&node.name, value),
        };
        stored.map_err(|err| ExecError::from_value(err, node.value.span()))?;
        debug!(name = %node.name, declared = ?node.declared, "assigned");
        Ok(0)
    }
}

/// What a forked pipeline stage leaves behind
#[derive(Debug)]
pub(crate) struct ForkedOutcome {
    pub result: Result<i32, ExecError>,
    /// Captured stderr, when the parent captures
    pub stderr: Vec<u8>,
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::parser::parse;

    pub fn interpreter() -> Interpreter {
        let mut env = Environment::new();
        env.assign("PATH", Value::Str(crate::interpreter::command_resolution::DEFAULT_PATH.into()))
            .unwrap();
        env.export("PATH");
        let mut interp = Interpreter::new(env, std::env::temp_dir());
        interp.set_capture(true);
        interp
    }

    /// Run `source` to completion in a capturing interpreter
    pub fn run(interp: &mut Interpreter, source: &str) -> Result<i32, ExecError> {
        let script = parse(source).unwrap();
        let status = interp.execute(&script);
        if let Ok(code) = status {
            interp.last_exit = code;
        }
        status
    }

    pub fn stdout_of(source: &str) -> String {
        let mut interp = interpreter();
        run(&mut interp, source).unwrap();
        interp.take_output().stdout_text()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_and_or_short_circuit() {
        assert_eq!(stdout_of("true && echo yes; false && echo no"), "yes\n");
        assert_eq!(stdout_of("false || echo fallback; true || echo skipped"), "fallback\n");
    }

    #[test]
    fn test_typed_and_weak_assignment() {
        let mut interp = interpreter();
        run(&mut interp, "int n=40; n=n+2; s=hello; float f=1").unwrap();
        assert_eq!(interp.env.get("n"), Some(&Value::Int(42)));
        assert_eq!(interp.env.get("s"), Some(&Value::Str("hello".into())));
        assert_eq!(interp.env.get("f"), Some(&Value::float(1.0)));
    }

    #[test]
    fn test_overflow_leaves_value_unchanged() {
        let mut interp = interpreter();
        let err = run(&mut interp, "int i=2147483647; i=i+1").unwrap_err();
        assert!(matches!(err, ExecError::Arithmetic { .. }));
        assert_eq!(interp.env.get("i"), Some(&Value::Int(i32::MAX)));
    }

    #[test]
    fn test_runtime_type_mismatch() {
        let mut interp = interpreter();
        interp.env.assign("text", Value::Str("abc".into())).unwrap();
        let err = run(&mut interp, "float f=$text").unwrap_err();
        assert!(matches!(err, ExecError::TypeMismatch { .. }));
        assert_eq!(interp.env.get("f"), None);
    }

    #[test]
    fn test_non_finite_text_is_rejected_at_runtime() {
        for text in ["nan", "inf", "-Infinity"] {
            let mut interp = interpreter();
            interp.env.assign("text", Value::Str(text.into())).unwrap();
            let err = run(&mut interp, "float f=$text").unwrap_err();
            assert!(matches!(err, ExecError::TypeMismatch { .. }), "{}", text);
            assert_eq!(interp.env.get("f"), None);
        }
    }

    #[test]
    fn test_float_keeps_written_form() {
        assert_eq!(stdout_of("float f=1e3; echo $f"), "1e3\n");
        assert_eq!(stdout_of("a=[1, 2.50, 1e3]; echo $a"), "1 2.50 1e3\n");
        assert_eq!(stdout_of("x=1e3+1; echo $x"), "1001.0\n");
    }

    #[test]
    fn test_array_interpolation() {
        assert_eq!(stdout_of("a=[1, \"foo\", 3.5]; echo $a"), "1 foo 3.5\n");
    }

    #[test]
    fn test_unbound_variable() {
        let mut interp = interpreter();
        let err = run(&mut interp, "echo $nope").unwrap_err();
        assert!(matches!(err, ExecError::UnboundVariable { ref name, .. } if name == "nope"));
    }

    #[test]
    fn test_exit_status_variable() {
        assert_eq!(stdout_of("false; echo $?"), "1\n");
    }
}
