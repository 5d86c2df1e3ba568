//! Standard Streams
//!
//! Where the interpreter's stdin, stdout and stderr point while a command
//! runs. Pipeline stages are joined by OS pipes, so in-process stages and
//! child processes stream into each other with the kernel's back-pressure:
//!
//! ```text
//!   writer ──▶ [pipe buffer] ──▶ reader
//!              ├── writer blocks when full
//!              ├── drop writer → EOF for the reader
//!              └── drop reader → broken pipe for the writer
//! ```

use std::fs::File;
use std::io;
use std::process::Stdio;

/// Destination of stdout or stderr
#[derive(Debug)]
pub enum OutputSink {
    /// The shell process's own stream
    Inherit,
    /// Collected in the interpreter's output buffer
    Capture,
    /// A pipe end or a redirection target
    File(File),
}

impl OutputSink {
    pub fn try_clone(&self) -> io::Result<Self> {
        Ok(match self {
            OutputSink::Inherit => OutputSink::Inherit,
            OutputSink::Capture => OutputSink::Capture,
            OutputSink::File(file) => OutputSink::File(file.try_clone()?),
        })
    }

    /// Stdio for a child process; None when the child's output must be
    /// collected by the parent instead
    pub fn to_stdio(&self) -> io::Result<Option<Stdio>> {
        Ok(match self {
            OutputSink::Inherit => Some(Stdio::inherit()),
            OutputSink::Capture => None,
            OutputSink::File(file) => Some(Stdio::from(file.try_clone()?)),
        })
    }
}

/// Source of stdin
#[derive(Debug)]
pub enum InputSource {
    Inherit,
    Null,
    File(File),
}

impl InputSource {
    pub fn try_clone(&self) -> io::Result<Self> {
        Ok(match self {
            InputSource::Inherit => InputSource::Inherit,
            InputSource::Null => InputSource::Null,
            InputSource::File(file) => InputSource::File(file.try_clone()?),
        })
    }

    pub fn to_stdio(&self) -> io::Result<Stdio> {
        Ok(match self {
            InputSource::Inherit => Stdio::inherit(),
            InputSource::Null => Stdio::null(),
            InputSource::File(file) => Stdio::from(file.try_clone()?),
        })
    }
}

/// Create an OS pipe as `(reader, writer)`.
///
/// Both ends are close-on-exec; a child only keeps the end installed as its
/// stdin or stdout.
#[cfg(target_os = "linux")]
pub fn pipe() -> io::Result<(File, File)> {
    use std::os::unix::io::FromRawFd;

    let mut fds = [0 as libc::c_int; 2];
    // SAFETY: `fds` has room for the two descriptors pipe2 writes
    if unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) } != 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: pipe2 returned two fresh descriptors that nothing else owns
    Ok(unsafe { (File::from_raw_fd(fds[0]), File::from_raw_fd(fds[1])) })
}

#[cfg(all(unix, not(target_os = "linux")))]
pub fn pipe() -> io::Result<(File, File)> {
    use std::os::unix::io::{AsRawFd, FromRawFd};

    let mut fds = [0 as libc::c_int; 2];
    // SAFETY: `fds` has room for the two descriptors pipe writes
    if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: pipe returned two fresh descriptors that nothing else owns
    let (reader, writer) = unsafe { (File::from_raw_fd(fds[0]), File::from_raw_fd(fds[1])) };
    for end in [&reader, &writer] {
        // SAFETY: the descriptor stays open for the duration of the call
        if unsafe { libc::fcntl(end.as_raw_fd(), libc::F_SETFD, libc::FD_CLOEXEC) } == -1 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok((reader, writer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    #[test]
    fn test_pipe_eof_after_writer_drops() {
        let (mut reader, mut writer) = pipe().unwrap();
        writer.write_all(b"through the pipe").unwrap();
        drop(writer);
        let mut text = String::new();
        reader.read_to_string(&mut text).unwrap();
        assert_eq!(text, "through the pipe");
    }

    #[test]
    fn test_write_after_reader_drops_is_broken_pipe() {
        let (reader, mut writer) = pipe().unwrap();
        drop(reader);
        let err = writer.write_all(b"nobody listens").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn test_captured_sink_has_no_stdio() {
        assert!(OutputSink::Capture.to_stdio().unwrap().is_none());
        assert!(OutputSink::Inherit.to_stdio().unwrap().is_some());
    }
}
