//! Builtin Command Dispatch
//!
//! Commands that run inside the shell process because they read or change
//! shell state: cd, export, unset, exit, break, continue, return, source,
//! vars. The rest (echo, pwd, true, false, test) are builtins so they work
//! without PATH.

use std::path::Path;

use crate::ast::types::Span;
use crate::interpreter::errors::{ExecError, EXIT_FAILURE, EXIT_SYNTAX};
use crate::interpreter::execution_engine::Interpreter;
use crate::interpreter::value::Value;
use crate::parser::lexer::is_valid_name;

/// Names dispatched to `run_builtin`
pub const SHELL_BUILTINS: &[&str] = &[
    "echo", "cd", "pwd", "exit", "true", "false", "export", "unset", "test", "[", "break", "continue", "return",
    "source", ".", "vars",
];

pub fn is_builtin(name: &str) -> bool {
    SHELL_BUILTINS.contains(&name)
}

impl Interpreter {
    /// Run a builtin; None when `name` is not one.
    pub fn run_builtin(&mut self, name: &str, args: &[String], span: Span) -> Option<Result<i32, ExecError>> {
        let result = match name {
            "echo" => self.builtin_echo(args),
            "cd" => Ok(self.builtin_cd(args)),
            "pwd" => {
                let line = format!("{}\n", self.cwd.display());
                self.write_stdout(line.as_bytes()).map(|()| 0)
            }
            "exit" => self.builtin_exit(args),
            "true" => Ok(0),
            "false" => Ok(1),
            "export" => self.builtin_export(args, span),
            "unset" => {
                for name in args {
                    self.env.unset(name);
                }
                Ok(0)
            }
            "test" => Ok(self.builtin_test(args)),
            "[" => match args.split_last() {
                Some((last, rest)) if last == "]" => Ok(self.builtin_test(rest)),
                _ => Ok(self.builtin_error("[: missing `]`", EXIT_SYNTAX)),
            },
            "break" | "continue" => self.builtin_loop_control(name, args),
            "return" => self.builtin_return(args),
            "source" | "." => self.builtin_source(name, args, span),
            "vars" => self.builtin_vars(),
            _ => return None,
        };
        Some(result)
    }

    fn builtin_error(&mut self, message: &str, code: i32) -> i32 {
        self.write_stderr(format!("{}\n", message).as_bytes());
        code
    }

    fn builtin_echo(&mut self, args: &[String]) -> Result<i32, ExecError> {
        let (newline, words) = match args.first() {
            Some(flag) if flag == "-n" => (false, &args[1..]),
            _ => (true, args),
        };
        let mut line = words.join(" ");
        if newline {
            line.push('\n');
        }
        self.write_stdout(line.as_bytes())?;
        Ok(0)
    }

    fn builtin_cd(&mut self, args: &[String]) -> i32 {
        let target = match args.first() {
            Some(dir) => dir.clone(),
            None => match self.env.get("HOME") {
                Some(home) => home.to_text(),
                None => return self.builtin_error("cd: HOME not set", EXIT_FAILURE),
            },
        };
        let resolved = match self.cwd.join(&target).canonicalize() {
            Ok(path) if path.is_dir() => path,
            Ok(_) => return self.builtin_error(&format!("cd: {}: Not a directory", target), EXIT_FAILURE),
            Err(_) => {
                return self.builtin_error(&format!("cd: {}: No such file or directory", target), EXIT_FAILURE)
            }
        };

        let old = self.cwd.display().to_string();
        self.cwd = resolved;
        let pwd = self.cwd.display().to_string();
        // Typed bindings of these names reject paths; cd itself still succeeds
        let _ = self.env.assign("OLDPWD", Value::Str(old));
        let _ = self.env.assign("PWD", Value::Str(pwd));
        0
    }

    fn builtin_exit(&mut self, args: &[String]) -> Result<i32, ExecError> {
        let code = match args.first() {
            None => self.last_exit,
            Some(arg) => match arg.parse::<i32>() {
                Ok(n) => n & 0xff,
                Err(_) => {
                    self.builtin_error(&format!("exit: {}: numeric argument required", arg), EXIT_SYNTAX);
                    EXIT_SYNTAX
                }
            },
        };
        Err(ExecError::Exit { code })
    }

    fn builtin_export(&mut self, args: &[String], span: Span) -> Result<i32, ExecError> {
        let mut status = 0;
        for arg in args {
            let (name, value) = match arg.split_once('=') {
                Some((name, value)) => (name, Some(value)),
                None => (arg.as_str(), None),
            };
            if !is_valid_name(name) {
                status = self.builtin_error(&format!("export: `{}`: not a valid identifier", arg), EXIT_FAILURE);
                continue;
            }
            if let Some(value) = value {
                self.env
                    .assign(name, Value::Str(value.to_string()))
                    .map_err(|err| ExecError::from_value(err, span))?;
            }
            self.env.export(name);
        }
        Ok(status)
    }

    fn builtin_loop_control(&mut self, name: &str, args: &[String]) -> Result<i32, ExecError> {
        let levels = match args.first().map(|a| a.parse::<u32>()) {
            None => 1,
            Some(Ok(n)) if n >= 1 => n,
            Some(_) => return Ok(self.builtin_error(&format!("{}: loop count out of range", name), EXIT_FAILURE)),
        };
        // Outside a loop both are no-ops
        if self.loop_depth == 0 {
            return Ok(0);
        }
        let levels = levels.min(self.loop_depth);
        Err(if name == "break" {
            ExecError::Break { levels }
        } else {
            ExecError::Continue { levels }
        })
    }

    fn builtin_vars(&mut self) -> Result<i32, ExecError> {
        let mut listing = String::new();
        for (name, binding) in self.env.visible() {
            if binding.exported {
                listing.push_str("export ");
            }
            if let Some(declared) = binding.declared {
                listing.push_str(declared.keyword());
                listing.push(' ');
            }
            listing.push_str(&format!("{}={}\n", name, binding.value));
        }
        self.write_stdout(listing.as_bytes())?;
        Ok(0)
    }

    fn builtin_test(&mut self, args: &[String]) -> i32 {
        match evaluate_test(args, &self.cwd) {
            Ok(true) => 0,
            Ok(false) => 1,
            Err(message) => self.builtin_error(&format!("test: {}", message), EXIT_SYNTAX),
        }
    }
}

/// Evaluate `test` arguments
pub fn evaluate_test(args: &[String], cwd: &Path) -> Result<bool, String> {
    match args {
        [] => Ok(false),
        [bang, rest @ ..] if bang == "!" => evaluate_test(rest, cwd).map(|b| !b),
        [single] => Ok(!single.is_empty()),
        [op, operand] => match op.as_str() {
            "-z" => Ok(operand.is_empty()),
            "-n" => Ok(!operand.is_empty()),
            "-e" => Ok(cwd.join(operand).exists()),
            "-f" => Ok(cwd.join(operand).is_file()),
            "-d" => Ok(cwd.join(operand).is_dir()),
            _ => Err(format!("{}: unary operator expected", op)),
        },
        [lhs, op, rhs] => match op.as_str() {
            "=" | "==" => Ok(lhs == rhs),
            "!=" => Ok(lhs != rhs),
            "-eq" | "-ne" | "-lt" | "-le" | "-gt" | "-ge" => compare_numbers(lhs, op, rhs),
            _ => Err(format!("{}: binary operator expected", op)),
        },
        _ => Err("too many arguments".to_string()),
    }
}

fn compare_numbers(lhs: &str, op: &str, rhs: &str) -> Result<bool, String> {
    let parse = |text: &str| Value::parse_number(text).ok_or_else(|| format!("{}: number expected", text));
    let (a, b) = (parse(lhs)?, parse(rhs)?);
    let ordering = a.compare(&b, crate::ast::types::BinaryOperator::Eq).map_err(|e| e.to_string())?;
    Ok(match op {
        "-eq" => ordering.is_eq(),
        "-ne" => ordering.is_ne(),
        "-lt" => ordering.is_lt(),
        "-le" => ordering.is_le(),
        "-gt" => ordering.is_gt(),
        _ => ordering.is_ge(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::execution_engine::test_support::{interpreter, run, stdout_of};

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_echo() {
        assert_eq!(stdout_of("echo a \"b c\""), "a b c\n");
        assert_eq!(stdout_of("echo -n x"), "x");
    }

    #[test]
    fn test_test_operators() {
        let cwd = std::env::temp_dir();
        assert_eq!(evaluate_test(&strings(&["a", "=", "a"]), &cwd), Ok(true));
        assert_eq!(evaluate_test(&strings(&["-z", ""]), &cwd), Ok(true));
        assert_eq!(evaluate_test(&strings(&["2", "-lt", "10"]), &cwd), Ok(true));
        assert_eq!(evaluate_test(&strings(&["2.5", "-gt", "2"]), &cwd), Ok(true));
        assert_eq!(evaluate_test(&strings(&["!", "1", "-eq", "1"]), &cwd), Ok(false));
        assert!(evaluate_test(&strings(&["x", "-eq", "1"]), &cwd).is_err());
        assert_eq!(evaluate_test(&strings(&["-d", "."]), &cwd), Ok(true));
    }

    #[test]
    fn test_bracket_requires_close() {
        let mut interp = interpreter();
        assert_eq!(run(&mut interp, "[ 1 -eq 1 ]").unwrap(), 0);
        assert_eq!(run(&mut interp, "[ 1 -eq 1").unwrap(), EXIT_SYNTAX);
    }

    #[test]
    fn test_cd_and_pwd() {
        let mut interp = interpreter();
        let root = Path::new("/").canonicalize().unwrap();
        run(&mut interp, "cd /").unwrap();
        assert_eq!(interp.cwd, root);
        assert_eq!(interp.take_output().stdout_text(), "");
        run(&mut interp, "pwd").unwrap();
        assert_eq!(interp.take_output().stdout_text(), format!("{}\n", root.display()));
        assert_eq!(run(&mut interp, "cd /definitely/not/here").unwrap(), EXIT_FAILURE);
    }

    #[test]
    fn test_export_marks_binding() {
        let mut interp = interpreter();
        run(&mut interp, "export GREETING=hi").unwrap();
        assert!(interp.env.exported().contains(&("GREETING".to_string(), "hi".to_string())));
    }

    #[test]
    fn test_exit_signal() {
        let mut interp = interpreter();
        let err = run(&mut interp, "exit 3; echo unreachable").unwrap_err();
        assert_eq!(err, ExecError::Exit { code: 3 });
        assert!(interp.take_output().stdout.is_empty());
    }

    #[test]
    fn test_vars_lists_declared_types() {
        let mut interp = interpreter();
        run(&mut interp, "int n=3; vars").unwrap();
        assert!(interp.take_output().stdout_text().contains("int n=3\n"));
    }
}
