//! Redirection Handling
//!
//! Opens the files named by `<`, `>`, `>>`, `2>` and `2>>`. Targets are
//! relative to the shell's working directory. When a stream is redirected
//! more than once the last redirection wins, as in other shells.

use std::fs::{File, OpenOptions};

use tracing::trace;

use crate::ast::types::{RedirectionNode, RedirectionOperator};
use crate::interpreter::errors::ExecError;
use crate::interpreter::execution_engine::Interpreter;
use crate::interpreter::streams::{InputSource, OutputSink};

/// Files opened for one command
#[derive(Debug, Default)]
pub struct Redirects {
    pub stdin: Option<File>,
    pub stdout: Option<File>,
    pub stderr: Option<File>,
}

impl Interpreter {
    pub fn open_redirections(&self, redirections: &[RedirectionNode]) -> Result<Redirects, ExecError> {
        let mut redirects = Redirects::default();
        for redirection in redirections {
            let target = self.expand_word(&redirection.target)?;
            let path = self.cwd.join(&target);
            trace!(op = redirection.operator.symbol(), path = %path.display(), "redirect");

            let opened = match redirection.operator {
                RedirectionOperator::Input => File::open(&path),
                RedirectionOperator::Output | RedirectionOperator::ErrOutput => File::create(&path),
                RedirectionOperator::Append | RedirectionOperator::ErrAppend => {
                    OpenOptions::new().create(true).append(true).open(&path)
                }
            };
            let file = opened.map_err(|err| ExecError::io(&err, &format!("cannot open `{}`", target), redirection.span))?;

            match redirection.operator {
                RedirectionOperator::Input => redirects.stdin = Some(file),
                RedirectionOperator::Output | RedirectionOperator::Append => redirects.stdout = Some(file),
                RedirectionOperator::ErrOutput | RedirectionOperator::ErrAppend => redirects.stderr = Some(file),
            }
        }
        Ok(redirects)
    }

    /// Run an in-process command with its redirections applied.
    ///
    /// The opened files replace the interpreter's streams for the duration
    /// of `f` and are closed afterwards.
    pub(crate) fn with_redirections(
        &mut self,
        redirections: &[RedirectionNode],
        f: impl FnOnce(&mut Self) -> Result<i32, ExecError>,
    ) -> Result<i32, ExecError> {
        if redirections.is_empty() {
            return f(self);
        }
        let Redirects { stdin, stdout, stderr } = self.open_redirections(redirections)?;
        self.with_streams(
            stdin.map(InputSource::File),
            stdout.map(OutputSink::File),
            stderr.map(OutputSink::File),
            f,
        )
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use crate::interpreter::execution_engine::test_support::{interpreter, run};

    #[test]
    fn test_builtin_output_to_file() {
        let dir = std::env::temp_dir().join(format!("ox-redirect-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();

        let mut interp = interpreter();
        interp.cwd = dir.clone();
        run(&mut interp, "echo one > out.txt; echo two >> out.txt").unwrap();
        assert_eq!(fs::read_to_string(dir.join("out.txt")).unwrap(), "one\ntwo\n");
        assert!(interp.take_output().stdout.is_empty());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_redirected_input_reaches_child() {
        if !std::path::Path::new("/bin/cat").exists() && !std::path::Path::new("/usr/bin/cat").exists() {
            return;
        }
        let dir = std::env::temp_dir().join(format!("ox-redirect-in-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("in.txt"), "from file\n").unwrap();

        let mut interp = interpreter();
        interp.cwd = dir.clone();
        run(&mut interp, "(cat; echo after) < in.txt 2> err.txt").unwrap();
        assert_eq!(interp.take_output().stdout_text(), "from file\nafter\n");
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_input_file() {
        let mut interp = interpreter();
        let err = run(&mut interp, "echo hi < /definitely/not/here").unwrap_err();
        assert!(err.to_string().starts_with("cannot open `/definitely/not/here`"));
    }
}
