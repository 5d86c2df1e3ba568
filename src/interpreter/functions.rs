//! Functions and Sourced Files
//!
//! `name() { ... }` stores a definition; calling it runs the body in a child
//! scope with the call's arguments as `$1`..`$9` and `$#`. Variables the body
//! creates stay local, existing outer ones are updated in place.
//!
//! `source FILE [ARGS]` (also `.`) runs a file in the current scope, so its
//! definitions outlive it. Both count toward the same call depth, and both
//! stop early on `return`.
//!
//! Every definition remembers the text it was parsed from. An error raised
//! in a body from another text is wrapped so it renders against that text.

use std::sync::Arc;

use tracing::debug;

use crate::ast::types::{FunctionDefNode, Span};
use crate::interpreter::environment::Binding;
use crate::interpreter::errors::{ExecError, EXIT_FAILURE, EXIT_SYNTAX, MAX_CALL_DEPTH};
use crate::interpreter::execution_engine::Interpreter;
use crate::interpreter::types::SourceFile;
use crate::interpreter::value::Value;
use crate::parser::parse;

/// Names of the positional parameters
const POSITIONAL: [&str; 10] = ["1", "2", "3", "4", "5", "6", "7", "8", "9", "#"];

#[derive(Debug)]
pub struct DefinedFunction {
    pub node: FunctionDefNode,
    /// Text the definition was parsed from
    pub origin: Option<Arc<SourceFile>>,
}

fn same_origin(a: &Option<Arc<SourceFile>>, b: &Option<Arc<SourceFile>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

impl Interpreter {
    pub(crate) fn define_function(&mut self, node: &FunctionDefNode) {
        debug!(name = %node.name, "define function");
        let function = DefinedFunction {
            node: node.clone(),
            origin: self.origin.clone(),
        };
        self.functions.insert(node.name.clone(), Arc::new(function));
    }

    pub(crate) fn call_function(
        &mut self,
        function: &DefinedFunction,
        args: &[String],
        span: Span,
    ) -> Result<i32, ExecError> {
        if self.call_depth >= MAX_CALL_DEPTH {
            return Err(ExecError::CallDepth {
                name: function.node.name.clone(),
                span,
            });
        }

        let caller_origin = std::mem::replace(&mut self.origin, function.origin.clone());
        let loop_depth = std::mem::replace(&mut self.loop_depth, 0);
        self.call_depth += 1;
        self.env.push_scope();
        self.set_positional(args);
        self.shadow_outer_positional(args.len());

        let result = self.execute_list(&function.node.body);

        self.env.pop_scope();
        self.call_depth -= 1;
        self.loop_depth = loop_depth;
        let callee_origin = std::mem::replace(&mut self.origin, caller_origin);

        match result {
            Err(ExecError::Return { code }) => Ok(code),
            Err(err) if !same_origin(&callee_origin, &self.origin) => Err(err.located(callee_origin)),
            other => other,
        }
    }

    /// Hide caller parameters past the ones this call received
    fn shadow_outer_positional(&mut self, given: usize) {
        for name in POSITIONAL.iter().take(9).skip(given) {
            if self.env.get(name).is_some() {
                self.env.set_local(name, Value::Str(String::new()));
            }
        }
    }

    pub(crate) fn builtin_return(&mut self, args: &[String]) -> Result<i32, ExecError> {
        if self.call_depth == 0 {
            let message = "return: can only `return` from a function or sourced file\n";
            self.write_stderr(message.as_bytes());
            return Ok(EXIT_FAILURE);
        }
        let code = match args.first() {
            None => self.last_exit,
            Some(arg) => match arg.parse::<i64>() {
                Ok(n) => (n & 0xff) as i32,
                Err(_) => {
                    let message = format!("return: {}: numeric argument required\n", arg);
                    self.write_stderr(message.as_bytes());
                    EXIT_SYNTAX
                }
            },
        };
        Err(ExecError::Return { code })
    }

    /// `source FILE [ARGS]` and `. FILE [ARGS]`
    pub(crate) fn builtin_source(&mut self, name: &str, args: &[String], span: Span) -> Result<i32, ExecError> {
        let args = match args.first() {
            Some(first) if first == "--" => &args[1..],
            _ => args,
        };
        let Some((file, script_args)) = args.split_first() else {
            let message = format!("{}: filename argument required\n", name);
            self.write_stderr(message.as_bytes());
            return Ok(EXIT_SYNTAX);
        };
        if self.call_depth >= MAX_CALL_DEPTH {
            return Err(ExecError::CallDepth {
                name: file.clone(),
                span,
            });
        }

        let text = match std::fs::read_to_string(self.cwd.join(file)) {
            Ok(text) => text,
            Err(err) => {
                let message = format!("{}: {}: {}\n", name, file, err);
                self.write_stderr(message.as_bytes());
                return Ok(EXIT_FAILURE);
            }
        };
        let source = Arc::new(SourceFile {
            name: file.clone(),
            text,
        });

        let script = match parse(&source.text) {
            Ok(script) => script,
            Err(exception) => {
                for error in &exception.errors {
                    let mut diagnostic = error.to_diagnostic(&source.text);
                    diagnostic.message = format!("{}: {}", file, diagnostic.message);
                    let rendered = diagnostic.render_after(self.stdout_line_open());
                    self.write_stderr(rendered.as_bytes());
                }
                return Ok(EXIT_SYNTAX);
            }
        };
        debug!(file = %file, statements = script.statements.len(), "source");

        let saved: Option<Vec<Option<Binding>>> = (!script_args.is_empty()).then(|| {
            POSITIONAL
                .iter()
                .map(|name| self.env.local(name).cloned())
                .collect()
        });
        if !script_args.is_empty() {
            self.set_positional(script_args);
        }
        let caller_origin = std::mem::replace(&mut self.origin, Some(Arc::clone(&source)));
        self.call_depth += 1;

        let result = self.execute(&script);

        self.call_depth -= 1;
        self.origin = caller_origin;
        if let Some(saved) = saved {
            for (name, binding) in POSITIONAL.iter().zip(saved) {
                self.env.restore_local(name, binding);
            }
        }

        match result {
            Err(ExecError::Return { code }) => Ok(code),
            Err(err) => Err(err.located(Some(source))),
            ok => ok,
        }
    }
}
