//! Subshell Execution
//!
//! Handles both kinds of `( ... )`:
//! - Ox bodies run in-process inside a child scope, so weak bindings made
//!   inside do not leak out; `cd` and loop state are restored afterwards
//! - foreign bodies (`#!interpreter`) become a spawn plan whose program is
//!   the resolved interpreter and whose script arrives as `/dev/fd/N`

use std::path::PathBuf;

use tracing::debug;

use crate::ast::types::{ForeignBody, ScriptNode, SubshellNode};
use crate::interpreter::command_resolution::{resolve_executable, Resolution, DEFAULT_PATH};
use crate::interpreter::errors::ExecError;
use crate::interpreter::execution_engine::Interpreter;
use crate::interpreter::pipeline_execution::SpawnPlan;
use crate::interpreter::process::ScriptFd;

/// State restored after an Ox subshell completes
#[derive(Debug, Clone)]
pub struct SubshellSavedState {
    pub cwd: PathBuf,
    pub loop_depth: u32,
}

impl SubshellSavedState {
    pub fn save(interp: &Interpreter) -> Self {
        Self {
            cwd: interp.cwd.clone(),
            loop_depth: interp.loop_depth,
        }
    }

    pub fn restore(self, interp: &mut Interpreter) {
        interp.cwd = self.cwd;
        interp.loop_depth = self.loop_depth;
    }
}

impl Interpreter {
    /// Run a nested Ox script in a child scope with `args` as `$1..$9`.
    pub(crate) fn execute_ox_subshell(&mut self, script: &ScriptNode, args: &[String]) -> Result<i32, ExecError> {
        let saved = SubshellSavedState::save(self);
        self.env.push_scope();
        if !args.is_empty() {
            self.set_positional(args);
        }
        self.loop_depth = 0;

        let result = self.execute_list(&script.statements);

        self.env.pop_scope();
        saved.restore(self);
        match result {
            // `exit` ends only this subshell
            Err(ExecError::Exit { code } | ExecError::Return { code }) => Ok(code),
            other => other,
        }
    }

    /// The search path seen by spawned programs
    pub(crate) fn search_path(&self) -> String {
        self.env
            .get("PATH")
            .map(|value| value.to_text())
            .unwrap_or_else(|| DEFAULT_PATH.to_string())
    }

    /// Resolve the interpreter and prepare the script descriptor.
    pub(crate) fn plan_foreign_subshell(&self, node: &SubshellNode, body: &ForeignBody) -> Result<SpawnPlan, ExecError> {
        let interpreter = self.expand_word(&body.interpreter)?;
        let program = match resolve_executable(&interpreter, &self.search_path(), &self.cwd) {
            Resolution::Found(path) => path,
            Resolution::NotExecutable(_) | Resolution::NotFound => {
                return Err(ExecError::InterpreterNotFound {
                    interpreter,
                    span: body.shebang_span,
                })
            }
        };
        debug!(interpreter = %interpreter, program = %program.display(), "resolved shebang");

        let script = ScriptFd::create(&body.text).map_err(|err| ExecError::ProcessSpawn {
            program: interpreter.clone(),
            reason: err.to_string(),
            span: node.span,
        })?;

        let mut args = body.interpreter_args.clone();
        args.push(script.path().display().to_string());
        args.extend(self.expand_words(&node.args)?);

        Ok(SpawnPlan {
            label: interpreter,
            program,
            args,
            redirects: self.open_redirections(&node.redirections)?,
            script: Some(script),
            span: node.span,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use crate::interpreter::errors::ExecError;
    use crate::interpreter::execution_engine::test_support::{interpreter, run, stdout_of};
    use crate::interpreter::value::Value;

    fn has(program: &str) -> bool {
        ["/usr/bin", "/bin", "/usr/local/bin"]
            .iter()
            .any(|dir| Path::new(dir).join(program).exists())
    }

    #[test]
    fn test_ox_subshell_scoping() {
        let mut interp = interpreter();
        run(&mut interp, "x=1; (x=2; y=3; echo $x)").unwrap();
        assert_eq!(interp.take_output().stdout_text(), "2\n");
        // Weak assignment updated the outer binding; the new one stayed inside
        assert_eq!(interp.env.get("x"), Some(&Value::Int(2)));
        assert_eq!(interp.env.get("y"), None);
    }

    #[test]
    fn test_ox_subshell_arguments() {
        assert_eq!(stdout_of("(echo $# $1 $2) a b"), "2 a b\n");
    }

    #[test]
    fn test_ox_subshell_exit_and_cd_stay_inside() {
        let mut interp = interpreter();
        let before = interp.cwd.clone();
        let status = run(&mut interp, "(cd /; exit 4); echo $?").unwrap();
        assert_eq!(status, 0);
        assert_eq!(interp.take_output().stdout_text(), "4\n");
        assert_eq!(interp.cwd, before);
    }

    #[test]
    fn test_interpreter_not_found() {
        let mut interp = interpreter();
        let err = run(&mut interp, "(#!no-such-interpreter-ox\nhello\n)").unwrap_err();
        assert!(matches!(err, ExecError::InterpreterNotFound { ref interpreter, .. } if interpreter == "no-such-interpreter-ox"));
        assert_eq!(err.exit_code(), 127);
    }

    #[test]
    fn test_foreign_subshell_by_name() {
        if !has("sh") {
            return;
        }
        assert_eq!(stdout_of("(#!sh\necho from sh \"$1\"\n) arg"), "from sh arg\n");
    }

    #[test]
    fn test_python_arguments() {
        if !has("python3") {
            return;
        }
        let script = "(#!/usr/bin/env python3\nimport sys\nprint(int(sys.argv[1]) * int(sys.argv[2]))\n) 2 4";
        assert_eq!(stdout_of(script), "8\n");
    }

    #[test]
    fn test_python_into_bash_pipeline() {
        if !has("python3") || !has("bash") || !has("sed") {
            return;
        }
        let script = "(#!/usr/bin/env python3\nprint(\"hello world\")\n) | (#!/usr/bin/env bash\nsed 's/hello/goodbye/'\n)";
        assert_eq!(stdout_of(script), "goodbye world\n");
    }
}
