//! Command Resolution
//!
//! Resolves command names and shebang interpreters to executables. A name
//! containing `/` is a path (relative ones are taken from the shell's working
//! directory); any other name is searched for in the PATH directories.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tracing::trace;

/// Default PATH value when not set in environment
pub const DEFAULT_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

/// Result of resolving a name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Executable file found
    Found(PathBuf),
    /// File exists but is a directory or lacks execute permission
    NotExecutable(PathBuf),
    NotFound,
}

/// Split PATH into individual directories
pub fn split_path(path_env: &str) -> Vec<&str> {
    path_env.split(':').filter(|s| !s.is_empty()).collect()
}

/// Check if a command name contains a path separator (making it a path reference)
pub fn is_path_command(command_name: &str) -> bool {
    command_name.contains('/')
}

/// Check if a file mode indicates the file is executable
pub fn is_executable_mode(mode: u32) -> bool {
    (mode & 0o111) != 0
}

fn probe(path: &Path) -> Resolution {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() && is_executable_mode(meta.permissions().mode()) => {
            Resolution::Found(path.to_path_buf())
        }
        Ok(_) => Resolution::NotExecutable(path.to_path_buf()),
        Err(_) => Resolution::NotFound,
    }
}

/// Resolve `name` against `search_path`, with relative paths based at `cwd`
pub fn resolve_executable(name: &str, search_path: &str, cwd: &Path) -> Resolution {
    if name.is_empty() {
        return Resolution::NotFound;
    }

    if is_path_command(name) {
        let path = Path::new(name);
        let full = if path.is_absolute() { path.to_path_buf() } else { cwd.join(path) };
        return probe(&full);
    }

    let mut first_blocked = None;
    for dir in split_path(search_path) {
        let dir = Path::new(dir);
        let dir = if dir.is_absolute() { dir.to_path_buf() } else { cwd.join(dir) };
        match probe(&dir.join(name)) {
            Resolution::Found(path) => {
                trace!(name, path = %path.display(), "resolved");
                return Resolution::Found(path);
            }
            Resolution::NotExecutable(path) => {
                first_blocked.get_or_insert(path);
            }
            Resolution::NotFound => {}
        }
    }

    // A non-executable match only counts when nothing better exists
    first_blocked.map_or(Resolution::NotFound, Resolution::NotExecutable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("ox-resolve-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_file(path: &Path, mode: u32) {
        fs::write(path, "#!/bin/sh\n").unwrap();
        fs::set_permissions(path, fs::Permissions::from_mode(mode)).unwrap();
    }

    #[test]
    fn test_split_path() {
        assert_eq!(split_path("/usr/bin::/bin:"), vec!["/usr/bin", "/bin"]);
    }

    #[test]
    fn test_searches_path_in_order() {
        let dir = scratch_dir("order");
        let (a, b) = (dir.join("a"), dir.join("b"));
        fs::create_dir_all(&a).unwrap();
        fs::create_dir_all(&b).unwrap();
        write_file(&b.join("tool"), 0o755);

        let search = format!("{}:{}", a.display(), b.display());
        assert_eq!(
            resolve_executable("tool", &search, &dir),
            Resolution::Found(b.join("tool"))
        );
        assert_eq!(resolve_executable("missing", &search, &dir), Resolution::NotFound);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_relative_path_uses_cwd() {
        let dir = scratch_dir("relative");
        write_file(&dir.join("run.sh"), 0o755);
        write_file(&dir.join("plain.txt"), 0o644);

        assert_eq!(
            resolve_executable("./run.sh", "", &dir),
            Resolution::Found(dir.join("./run.sh"))
        );
        assert_eq!(
            resolve_executable("./plain.txt", "", &dir),
            Resolution::NotExecutable(dir.join("./plain.txt"))
        );
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_absolute_interpreter() {
        if Path::new("/bin/sh").exists() {
            assert!(matches!(
                resolve_executable("/bin/sh", DEFAULT_PATH, Path::new("/")),
                Resolution::Found(_)
            ));
        }
        assert_eq!(
            resolve_executable("/definitely/not/here", DEFAULT_PATH, Path::new("/")),
            Resolution::NotFound
        );
    }
}
