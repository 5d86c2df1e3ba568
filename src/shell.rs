//! Ox Shell Environment
//!
//! Main entry point for the shell. Ties together the lexer, parser,
//! execution engine and prompt renderer.
//!
//! Scripts run one statement at a time: each statement is parsed and then
//! executed before the next one is parsed, so output that precedes a syntax
//! error is emitted before the error is reported. A script stops executing
//! at its first syntax error; an interactive shell skips the statement and
//! carries on.

use std::collections::HashMap;
use std::path::PathBuf;

use tracing::debug;

use crate::diagnostic::Diagnostic;
use crate::interpreter::environment::Environment;
use crate::interpreter::errors::{ExecError, EXIT_BROKEN_PIPE, EXIT_SYNTAX};
use crate::interpreter::execution_engine::Interpreter;
use crate::interpreter::types::ExecResult;
use crate::parser::{parse_tokens, tokenize, Parser, SyntaxError};
use crate::prompt::{expand, PromptGlyphs, PromptState, DEFAULT_PROMPT};

/// Options for creating a Shell.
#[derive(Debug, Clone, Default)]
pub struct ShellOptions {
    /// Keep going after runtime errors
    pub interactive: bool,
    /// Collect stdout/stderr into the `ExecResult` instead of the process streams
    pub capture_output: bool,
    /// Working directory (defaults to the process working directory)
    pub cwd: Option<PathBuf>,
    /// Environment variables (defaults to the process environment)
    pub env: Option<HashMap<String, String>>,
    /// Prompt template (defaults to `DEFAULT_PROMPT`)
    pub prompt: Option<String>,
    /// Positional parameters `$1..$9`
    pub args: Vec<String>,
}

/// The main Ox shell environment.
pub struct Shell {
    interp: Interpreter,
    interactive: bool,
    prompt: String,
    glyphs: PromptGlyphs,
    exited: bool,
}

impl Shell {
    pub fn new(options: ShellOptions) -> Self {
        let env = match options.env {
            Some(vars) => Environment::from_vars(vars),
            None => Environment::from_process_env(),
        };
        let cwd = options
            .cwd
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("/"));

        let mut interp = Interpreter::new(env, cwd);
        interp.set_capture(options.capture_output);
        if !options.args.is_empty() {
            interp.set_positional(&options.args);
        }

        Self {
            interp,
            interactive: options.interactive,
            prompt: options.prompt.unwrap_or_else(|| DEFAULT_PROMPT.to_string()),
            glyphs: PromptGlyphs::default(),
            exited: false,
        }
    }

    /// Execute a script.
    pub fn exec(&mut self, source: &str) -> ExecResult {
        debug!(bytes = source.len(), "exec");
        let status = self.run(source);
        self.interp.last_exit = status;
        let output = self.interp.take_output();
        ExecResult::new(output.stdout_text(), output.stderr_text(), status)
    }

    fn run(&mut self, source: &str) -> i32 {
        let tokens = match tokenize(source) {
            Ok(tokens) => tokens,
            Err(err) => {
                self.report_syntax(&SyntaxError::from(err), source);
                return EXIT_SYNTAX;
            }
        };
        self.interp.set_origin("", source);

        let mut parser = Parser::new(tokens);
        let mut status = self.interp.last_exit;
        // After a syntax error a script runs nothing more, but the rest is
        // still parsed so every error gets reported
        let mut halted = false;
        while let Some(parsed) = parser.next_statement() {
            let nested: Vec<SyntaxError> = parser.extra_errors.drain(..).collect();
            let statement = match parsed {
                Ok(statement) if nested.is_empty() => statement,
                parsed => {
                    if let Err(err) = &parsed {
                        self.report_syntax(err, source);
                    }
                    nested.iter().for_each(|err| self.report_syntax(err, source));
                    status = EXIT_SYNTAX;
                    self.interp.last_exit = status;
                    halted = !self.interactive;
                    continue;
                }
            };
            if halted {
                continue;
            }

            match self.interp.execute_statement(&statement) {
                Ok(code) => status = code,
                Err(ExecError::Exit { code }) => {
                    self.exited = true;
                    return code;
                }
                Err(ExecError::BrokenPipe) => {
                    debug!("stdout closed by reader");
                    self.exited = true;
                    return EXIT_BROKEN_PIPE;
                }
                Err(err) => {
                    status = err.exit_code();
                    self.interp.last_exit = status;
                    if let Some(diagnostic) = err.to_diagnostic(source) {
                        self.report(&diagnostic);
                    }
                    if !self.interactive {
                        return status;
                    }
                }
            }
        }
        status
    }

    fn report_syntax(&mut self, err: &SyntaxError, source: &str) {
        self.report(&err.to_diagnostic(source));
    }

    fn report(&mut self, diagnostic: &Diagnostic) {
        let rendered = diagnostic.render_after(self.interp.stdout_line_open());
        self.interp.write_stderr(rendered.as_bytes());
    }

    /// True when `source` only fails because a construct is still open.
    pub fn is_incomplete(source: &str) -> bool {
        match tokenize(source) {
            Err(err) => err.incomplete,
            Ok(tokens) => matches!(parse_tokens(tokens), Err(e) if e.is_incomplete()),
        }
    }

    /// Render the configured prompt against the current state
    pub fn render_prompt(&self) -> String {
        let mut state = PromptState::new(self.interp.last_exit, self.interp.cwd.clone());
        state.glyphs = self.glyphs.clone();
        expand(&self.prompt, &state, &self.interp.env)
    }

    pub fn set_glyphs(&mut self, glyphs: PromptGlyphs) {
        self.glyphs = glyphs;
    }

    /// Set by `exit`; the REPL stops reading input
    pub fn has_exited(&self) -> bool {
        self.exited
    }

    pub fn last_exit(&self) -> i32 {
        self.interp.last_exit
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interp
    }

    pub fn interpreter_mut(&mut self) -> &mut Interpreter {
        &mut self.interp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::command_resolution::DEFAULT_PATH;

    fn shell(interactive: bool) -> Shell {
        let mut env = HashMap::new();
        env.insert("PATH".to_string(), DEFAULT_PATH.to_string());
        env.insert("HOME".to_string(), "/".to_string());
        Shell::new(ShellOptions {
            interactive,
            capture_output: true,
            cwd: Some(std::env::temp_dir()),
            env: Some(env),
            ..Default::default()
        })
    }

    #[test]
    fn test_done_outside_loop_after_output() {
        let mut sh = shell(false);
        let source = "if true; then echo foo; fi; done";
        let result = sh.exec(source);
        assert_eq!(result.stdout, "foo\n");
        assert_eq!(result.exit_code, EXIT_SYNTAX);
        let expected = format!(
            "\n1;29 - Found `done` outside of loop context\n\n{}\n{}^~~^\n",
            source,
            " ".repeat(28)
        );
        assert_eq!(result.stderr, expected);
    }

    #[test]
    fn test_every_syntax_error_is_reported() {
        let mut sh = shell(false);
        let result = sh.exec("echo one\ndone\necho two\nfi\necho three");
        assert_eq!(result.stdout, "one\n");
        assert_eq!(result.exit_code, EXIT_SYNTAX);
        assert!(result.stderr.contains("\n2;1 - Found `done` outside of loop context\n"));
        assert!(result.stderr.contains("\n4;1 - Found `fi` outside of if context\n"));
    }

    #[test]
    fn test_unterminated_output_before_error() {
        let mut sh = shell(false);
        let result = sh.exec("echo -n partial; done");
        assert_eq!(result.stdout, "partial");
        assert!(result.stderr.starts_with("\n\n1;18 - Found `done`"));
    }

    #[test]
    fn test_non_finite_float_is_rejected() {
        for source in ["float f=nan", "float f=inf"] {
            let mut sh = shell(false);
            let result = sh.exec(source);
            assert_eq!(result.exit_code, EXIT_SYNTAX, "{}", source);
            assert!(result.stderr.contains("1;9 - Type mismatch"), "{}", result.stderr);
        }
    }

    #[test]
    fn test_function_error_renders_against_its_definition() {
        let mut sh = shell(true);
        sh.exec("f() {\n  echo $nope\n}");
        let result = sh.exec("echo before; f");
        assert_eq!(result.stdout, "before\n");
        assert!(result.stderr.contains("2;8 - Unbound variable `nope`\n\n  echo $nope\n"), "{}", result.stderr);
    }

    #[test]
    fn test_pipeline_reader_exits_early() {
        let mut sh = shell(false);
        let result = sh.exec("(while true; do echo y; done) | head -n 1; echo after");
        assert_eq!(result.stdout, "y\nafter\n");
        assert_eq!(result.exit_code, 0);
    }

    #[test]
    fn test_runtime_error_stops_script() {
        let mut sh = shell(false);
        let result = sh.exec("int i=2147483647\ni=i+1\necho after");
        assert_eq!(result.exit_code, 1);
        assert_eq!(result.stdout, "");
        assert!(result.stderr.starts_with("\n2;3 - Arithmetic error: integer overflow"));
        assert!(result.stderr.contains("i=i+1\n  ^~^\n"));
    }

    #[test]
    fn test_interactive_continues_after_error() {
        let mut sh = shell(true);
        let result = sh.exec("echo $missing; echo next");
        assert_eq!(result.stdout, "next\n");
        assert!(result.stderr.contains("Unbound variable `missing`"));
        assert_eq!(result.exit_code, 0);
    }

    #[test]
    fn test_parse_time_type_mismatch() {
        let mut sh = shell(false);
        let result = sh.exec("int i=\"foo\"");
        assert_eq!(result.exit_code, EXIT_SYNTAX);
        assert!(result.stderr.contains("1;7 - "));
    }

    #[test]
    fn test_exit_stops_shell() {
        let mut sh = shell(true);
        let result = sh.exec("echo a; exit 5; echo b");
        assert_eq!(result.stdout, "a\n");
        assert_eq!(result.exit_code, 5);
        assert!(sh.has_exited());
    }

    #[test]
    fn test_state_persists_between_execs() {
        let mut sh = shell(true);
        sh.exec("string greeting=hi");
        assert_eq!(sh.exec("echo $greeting").stdout, "hi\n");
        assert_eq!(sh.exec("false").exit_code, 1);
        assert_eq!(sh.exec("echo $?").stdout, "1\n");
    }

    #[test]
    fn test_incomplete_input() {
        assert!(Shell::is_incomplete("if true; then"));
        assert!(Shell::is_incomplete("echo \"open"));
        assert!(!Shell::is_incomplete("echo done"));
        assert!(!Shell::is_incomplete("fi"));
    }

    #[test]
    fn test_render_prompt() {
        let mut sh = Shell::new(ShellOptions {
            capture_output: true,
            cwd: Some(PathBuf::from("/")),
            env: Some(HashMap::new()),
            prompt: Some("\\?\\(!\\F\\)> ".to_string()),
            ..Default::default()
        });
        assert_eq!(sh.render_prompt(), "0> ");
        sh.exec("false");
        assert_eq!(sh.render_prompt(), "1!✘> ");
    }
}
