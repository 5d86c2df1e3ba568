//! Pipeline Execution
//!
//! Handles execution of command pipelines (cmd1 | cmd2 | cmd3).
//!
//! Adjacent stages are joined by OS pipes and every stage runs at the same
//! time, so data streams through with the kernel's back-pressure:
//! - external programs and foreign subshells are child processes with the
//!   pipe ends installed as their stdin and stdout
//! - in-process stages (builtins, functions, assignments, blocks, Ox
//!   subshells) run on scoped threads, each with a forked interpreter
//!   whose streams are the pipe ends
//! - an in-process final stage runs on the calling thread once every other
//!   stage has started, so its effects on shell state persist
//!
//! A stage whose reader exits early sees a broken pipe and stops with 141.
//! Every child is reaped and every thread joined before the pipeline
//! returns, including when a later stage fails to start.

use std::fs::File;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread::ScopedJoinHandle;

use tracing::{debug, warn};

use crate::ast::types::{CommandNode, PipelineNode, Span, SubshellBody};
use crate::interpreter::builtin_dispatch::is_builtin;
use crate::interpreter::command_resolution::{resolve_executable, Resolution};
use crate::interpreter::errors::{ExecError, EXIT_BROKEN_PIPE, EXIT_FAILURE};
use crate::interpreter::execution_engine::{ForkedOutcome, Interpreter};
use crate::interpreter::process::{ProcessHandle, ProcessIo, ScriptFd};
use crate::interpreter::redirections::Redirects;
use crate::interpreter::streams::{pipe, InputSource, OutputSink};
use crate::interpreter::types::PipelineStatus;

/// Everything needed to start one external stage
#[derive(Debug)]
pub struct SpawnPlan {
    pub label: String,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub redirects: Redirects,
    pub script: Option<ScriptFd>,
    pub span: Span,
}

/// A stage that has been started
enum Started<'scope> {
    Process(ProcessHandle),
    Thread(ScopedJoinHandle<'scope, ForkedOutcome>),
}

impl Interpreter {
    /// Execute a pipeline and record its status in `$?`.
    pub fn execute_pipeline(&mut self, pipeline: &PipelineNode) -> Result<i32, ExecError> {
        let status = self.run_stages(&pipeline.commands)?;
        let mut code = status.final_exit_code();
        if pipeline.negated {
            code = i32::from(code == 0);
        }
        self.pipestatus = status.stages;
        self.last_exit = code;
        Ok(code)
    }

    /// Start every stage, run an in-process tail, then collect statuses
    pub(crate) fn run_stages(&mut self, commands: &[CommandNode]) -> Result<PipelineStatus, ExecError> {
        let count = commands.len();
        std::thread::scope(|scope| {
            let mut started: Vec<Started<'_>> = Vec::with_capacity(count);
            let mut upstream: Option<File> = None;
            let mut tail: Option<(&CommandNode, Option<File>)> = None;
            let mut failure: Option<ExecError> = None;

            for (i, command) in commands.iter().enumerate() {
                let input = upstream.take();
                let (reader, writer) = if i + 1 == count {
                    (None, None)
                } else {
                    match pipe() {
                        Ok((reader, writer)) => (Some(reader), Some(writer)),
                        Err(err) => {
                            failure = Some(ExecError::io(&err, "failed to create pipe", command.span()));
                            break;
                        }
                    }
                };

                let plan = match self.plan_spawn(command) {
                    Ok(plan) => plan,
                    Err(err) => {
                        failure = Some(err);
                        break;
                    }
                };
                match (plan, writer) {
                    (Some(plan), writer) => match self.spawn_stage(plan, input, writer) {
                        Ok(handle) => started.push(Started::Process(handle)),
                        Err(err) => {
                            failure = Some(err);
                            break;
                        }
                    },
                    (None, None) => tail = Some((command, input)),
                    (None, Some(writer)) => {
                        let fork = self.fork_stage(input.map(InputSource::File), OutputSink::File(writer));
                        match fork {
                            Ok(fork) => {
                                debug!(stage = i, kind = command.kind_name(), "stage on thread");
                                started.push(Started::Thread(scope.spawn(move || fork.run_forked(command))));
                            }
                            Err(err) => {
                                failure = Some(ExecError::io(&err, "failed to set up stage", command.span()));
                                break;
                            }
                        }
                    }
                }
                upstream = reader;
            }
            // Upstream stages see a closed reader if the loop stopped early
            drop(upstream);

            let tail_result = match tail {
                Some((command, input)) if failure.is_none() => {
                    let result = self.with_streams(input.map(InputSource::File), None, None, |interp| {
                        interp.execute_command(command)
                    });
                    Some(match result {
                        Err(ExecError::Exit { code } | ExecError::Return { code }) if count > 1 => Ok(code),
                        Err(ExecError::BrokenPipe) if count > 1 => Ok(EXIT_BROKEN_PIPE),
                        other => other,
                    })
                }
                _ => None,
            };

            let mut stages = Vec::with_capacity(count);
            for stage in started {
                match stage {
                    Started::Process(handle) => {
                        let label = handle.label().to_string();
                        match handle.wait() {
                            Ok(outcome) => {
                                if let Err(err) = self.write_stdout(&outcome.stdout) {
                                    failure.get_or_insert(err);
                                }
                                self.write_stderr(&outcome.stderr);
                                stages.push(outcome.exit_code);
                            }
                            Err(err) => {
                                warn!(%label, %err, "wait failed");
                                stages.push(EXIT_FAILURE);
                                let span = commands.last().map(|c| c.span()).unwrap_or_default();
                                failure.get_or_insert(ExecError::io(&err, "failed to wait for process", span));
                            }
                        }
                    }
                    Started::Thread(handle) => match handle.join() {
                        Ok(forked) => {
                            self.write_stderr(&forked.stderr);
                            match forked.result {
                                Ok(code) => stages.push(code),
                                Err(err) => {
                                    stages.push(err.exit_code());
                                    failure.get_or_insert(err);
                                }
                            }
                        }
                        Err(_) => {
                            warn!("pipeline stage panicked");
                            stages.push(EXIT_FAILURE);
                        }
                    },
                }
            }

            match tail_result {
                Some(Ok(code)) => stages.push(code),
                Some(Err(err)) => {
                    stages.push(err.exit_code());
                    failure.get_or_insert(err);
                }
                None => {}
            }

            if let Some(err) = failure {
                return Err(err);
            }
            debug!(?stages, "pipeline finished");
            Ok(PipelineStatus { stages })
        })
    }

    /// Decide whether a command needs a child process
    fn plan_spawn(&self, command: &CommandNode) -> Result<Option<SpawnPlan>, ExecError> {
        match command {
            CommandNode::Simple(node) => {
                let mut words = self.expand_words(&node.words)?;
                if words.is_empty() || is_builtin(&words[0]) || self.functions.contains_key(&words[0]) {
                    return Ok(None);
                }
                let name = words.remove(0);
                let program = match resolve_executable(&name, &self.search_path(), &self.cwd) {
                    Resolution::Found(path) => path,
                    Resolution::NotExecutable(path) => {
                        return Err(ExecError::ProcessSpawn {
                            program: name,
                            reason: format!("{} is not executable", path.display()),
                            span: node.span,
                        })
                    }
                    Resolution::NotFound => {
                        return Err(ExecError::CommandNotFound { name, span: node.span })
                    }
                };
                Ok(Some(SpawnPlan {
                    label: name,
                    program,
                    args: words,
                    redirects: self.open_redirections(&node.redirections)?,
                    script: None,
                    span: node.span,
                }))
            }
            CommandNode::Subshell(node) => match &node.body {
                SubshellBody::Foreign(body) => self.plan_foreign_subshell(node, body).map(Some),
                SubshellBody::Ox(_) => Ok(None),
            },
            _ => Ok(None),
        }
    }

    /// Start a child. Redirections win over pipe ends, which win over the
    /// interpreter's own streams.
    fn spawn_stage(
        &mut self,
        plan: SpawnPlan,
        input: Option<File>,
        output: Option<File>,
    ) -> Result<ProcessHandle, ExecError> {
        let SpawnPlan {
            label,
            program,
            args,
            redirects,
            script,
            span,
        } = plan;
        let stream_error = |err: std::io::Error| ExecError::ProcessSpawn {
            program: label.clone(),
            reason: err.to_string(),
            span,
        };

        let mut command = Command::new(&program);
        command
            .args(&args)
            .current_dir(&self.cwd)
            .env_clear()
            .envs(self.env.exported());

        let mut io = ProcessIo::default();
        let stdin = match (redirects.stdin, input) {
            (Some(file), _) | (None, Some(file)) => Stdio::from(file),
            (None, None) => self.stdin.to_stdio().map_err(stream_error)?,
        };
        command.stdin(stdin);

        let to_terminal = redirects.stdout.is_none() && output.is_none();
        match (redirects.stdout, output) {
            (Some(file), _) | (None, Some(file)) => {
                command.stdout(Stdio::from(file));
            }
            (None, None) => match self.stdout.to_stdio().map_err(stream_error)? {
                Some(stdio) => {
                    command.stdout(stdio);
                }
                None => io.capture_stdout = true,
            },
        }
        match redirects.stderr {
            Some(file) => {
                command.stderr(Stdio::from(file));
            }
            None => match self.stderr.to_stdio().map_err(stream_error)? {
                Some(stdio) => {
                    command.stderr(stdio);
                }
                None => io.capture_stderr = true,
            },
        }
        if to_terminal && matches!(self.stdout, OutputSink::Inherit) {
            // The child's output is not seen here; assume it ends its lines
            self.line_open = false;
        }

        debug!(label = %label, program = %program.display(), ?args, "dispatch");
        ProcessHandle::spawn(&label, command, io, script).map_err(stream_error)
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use crate::interpreter::errors::{ExecError, EXIT_BROKEN_PIPE};
    use crate::interpreter::execution_engine::test_support::{interpreter, run, stdout_of};

    fn has(program: &str) -> bool {
        Path::new("/bin").join(program).exists() || Path::new("/usr/bin").join(program).exists()
    }

    #[test]
    fn test_external_pipeline() {
        if !has("tr") || !has("sort") {
            return;
        }
        assert_eq!(stdout_of("echo b a c | tr ' ' '\\n' | sort"), "a\nb\nc\n");
    }

    #[test]
    fn test_builtin_feeds_external() {
        if !has("cat") {
            return;
        }
        assert_eq!(stdout_of("echo piped | cat"), "piped\n");
    }

    #[test]
    fn test_final_stage_status_and_negation() {
        if !has("cat") {
            return;
        }
        let mut interp = interpreter();
        assert_eq!(run(&mut interp, "false | true").unwrap(), 0);
        assert_eq!(interp.pipestatus, vec![1, 0]);
        assert_eq!(run(&mut interp, "! true").unwrap(), 1);
        assert_eq!(run(&mut interp, "! false | cat").unwrap(), 1);
    }

    #[test]
    fn test_command_not_found() {
        let mut interp = interpreter();
        let err = run(&mut interp, "no-such-command-ox arg").unwrap_err();
        assert!(matches!(err, ExecError::CommandNotFound { .. }));
        assert_eq!(err.exit_code(), 127);
    }

    #[test]
    fn test_failed_stage_reaps_started_children() {
        if !has("cat") {
            return;
        }
        let mut interp = interpreter();
        let err = run(&mut interp, "echo data | cat | no-such-command-ox").unwrap_err();
        assert!(matches!(err, ExecError::CommandNotFound { .. }));
    }

    #[test]
    fn test_external_stderr_captured() {
        if !has("sh") {
            return;
        }
        let mut interp = interpreter();
        run(&mut interp, "sh -c 'echo oops >&2'").unwrap();
        assert_eq!(interp.take_output().stderr_text(), "oops\n");
    }

    #[test]
    fn test_subshell_consumer_closes_pipe_early() {
        if !has("yes") || !has("head") {
            return;
        }
        let mut interp = interpreter();
        run(&mut interp, "yes | (head -n 1)").unwrap();
        assert_eq!(interp.take_output().stdout_text(), "y\n");
        assert_eq!(interp.pipestatus.len(), 2);
        assert_eq!(interp.pipestatus[1], 0);
    }

    #[test]
    fn test_subshell_producer_stops_when_reader_exits() {
        if !has("head") {
            return;
        }
        let mut interp = interpreter();
        let status = run(&mut interp, "(while true; do echo y; done) | head -n 1").unwrap();
        assert_eq!(status, 0);
        assert_eq!(interp.take_output().stdout_text(), "y\n");
        assert_eq!(interp.pipestatus, vec![EXIT_BROKEN_PIPE, 0]);
    }

    #[test]
    fn test_in_process_stages_stream_into_each_other() {
        let mut interp = interpreter();
        run(&mut interp, "(while true; do echo y; done) | (echo first)").unwrap();
        assert_eq!(interp.take_output().stdout_text(), "first\n");
        assert_eq!(interp.pipestatus, vec![EXIT_BROKEN_PIPE, 0]);
    }

    #[test]
    fn test_forked_stage_state_stays_in_stage() {
        let mut interp = interpreter();
        run(&mut interp, "x=1; (x=2; exit 3) | true; echo $x $?").unwrap();
        assert_eq!(interp.take_output().stdout_text(), "1 0\n");
    }

    #[test]
    fn test_ox_subshell_reads_pipe() {
        if !has("cat") {
            return;
        }
        assert_eq!(stdout_of("echo inner | (cat)"), "inner\n");
    }
}
