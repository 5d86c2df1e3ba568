//! Process Handles
//!
//! Spawned commands and foreign subshells. A handle owns the child, the
//! threads draining its captured streams, and the descriptor carrying a
//! subshell body. Everything is released in `wait`.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;

use tracing::{debug, trace};

/// Convert an exit status to a shell status; signals map to 128 + n
#[cfg(unix)]
pub fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signal)) => 128 + signal,
        (None, None) => 1,
    }
}

#[cfg(not(unix))]
pub fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}

// =============================================================================
// SCRIPT DESCRIPTOR
// =============================================================================

/// Subshell body handed to an interpreter as `/dev/fd/N`.
///
/// The interpreter reads its program from the descriptor, leaving its
/// standard input free for pipeline data.
#[derive(Debug)]
pub struct ScriptFd {
    file: File,
    path: PathBuf,
}

impl ScriptFd {
    #[cfg(target_os = "linux")]
    pub fn create(text: &str) -> io::Result<Self> {
        use std::ffi::CString;
        use std::io::{Seek, SeekFrom};
        use std::os::unix::io::FromRawFd;

        let name = CString::new("ox-subshell").map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        // SAFETY: `name` is a valid NUL-terminated string for the duration of the call
        let fd = unsafe { libc::memfd_create(name.as_ptr(), libc::MFD_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: memfd_create returned a fresh descriptor that nothing else owns
        let mut file = unsafe { File::from_raw_fd(fd) };
        file.write_all(text.as_bytes())?;
        file.seek(SeekFrom::Start(0))?;
        trace!(fd, bytes = text.len(), "subshell body in memfd");
        Ok(Self {
            file,
            path: PathBuf::from(format!("/dev/fd/{}", fd)),
        })
    }

    #[cfg(not(target_os = "linux"))]
    pub fn create(text: &str) -> io::Result<Self> {
        use std::sync::atomic::{AtomicUsize, Ordering};
        static COUNTER: AtomicUsize = AtomicUsize::new(0);

        let path = std::env::temp_dir().join(format!(
            "ox-subshell-{}-{}",
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        let mut file = File::create(&path)?;
        file.write_all(text.as_bytes())?;
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Let the next child spawned from `command` inherit the descriptor
    #[cfg(target_os = "linux")]
    pub fn share_with(&self, command: &mut Command) {
        use std::os::unix::io::AsRawFd;
        use std::os::unix::process::CommandExt;

        let fd = self.file.as_raw_fd();
        // SAFETY: fcntl is async-signal-safe and touches only the child's copy of `fd`
        unsafe {
            command.pre_exec(move || {
                if libc::fcntl(fd, libc::F_SETFD, 0) == -1 {
                    return Err(io::Error::last_os_error());
                }
                Ok(())
            });
        }
    }

    #[cfg(not(target_os = "linux"))]
    pub fn share_with(&self, _command: &mut Command) {}
}

#[cfg(not(target_os = "linux"))]
impl Drop for ScriptFd {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

// =============================================================================
// PROCESS HANDLE
// =============================================================================

/// How the parent deals with a child's streams beyond the `Stdio` already set
#[derive(Debug, Default)]
pub struct ProcessIo {
    /// Collect stdout into the outcome
    pub capture_stdout: bool,
    /// Collect stderr into the outcome
    pub capture_stderr: bool,
}

/// What a finished process left behind
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

#[derive(Debug)]
pub struct ProcessHandle {
    label: String,
    child: Child,
    stdout_reader: Option<JoinHandle<Vec<u8>>>,
    stderr_reader: Option<JoinHandle<Vec<u8>>>,
    _script: Option<ScriptFd>,
}

impl ProcessHandle {
    /// Spawn `command`; the stream settings in `io` override its Stdio
    pub fn spawn(label: &str, mut command: Command, io: ProcessIo, script: Option<ScriptFd>) -> io::Result<Self> {
        if let Some(script) = &script {
            script.share_with(&mut command);
        }
        if io.capture_stdout {
            command.stdout(Stdio::piped());
        }
        if io.capture_stderr {
            command.stderr(Stdio::piped());
        }

        let mut child = command.spawn()?;
        debug!(label, pid = child.id(), "spawned");

        let stdout_reader = if io.capture_stdout {
            child.stdout.take().map(drain)
        } else {
            None
        };
        let stderr_reader = if io.capture_stderr {
            child.stderr.take().map(drain)
        } else {
            None
        };

        Ok(Self {
            label: label.to_string(),
            child,
            stdout_reader,
            stderr_reader,
            _script: script,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Reap the child and join every helper thread
    pub fn wait(mut self) -> io::Result<ProcessOutcome> {
        let status = self.child.wait();
        let stdout = join_reader(self.stdout_reader.take());
        let stderr = join_reader(self.stderr_reader.take());
        let exit_code = exit_code(status?);
        debug!(label = %self.label, exit_code, "reaped");
        Ok(ProcessOutcome {
            exit_code,
            stdout,
            stderr,
        })
    }
}

fn drain<R: Read + Send + 'static>(mut stream: R) -> JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = stream.read_to_end(&mut buf);
        buf
    })
}

fn join_reader(reader: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    reader.and_then(|r| r.join().ok()).unwrap_or_default()
}
