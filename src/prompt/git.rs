//! Git Repository State
//!
//! Branch and status signs for `\B` and `\G`. Lookups go through the
//! `RepoProbe` trait so the expander can be tested with a synthetic
//! repository.

use std::path::Path;

use git2::{BranchType, ErrorCode, Repository, Status, StatusOptions, StatusShow};
use tracing::trace;

/// Branch name and status signs of a working tree
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitSnapshot {
    /// None for a detached HEAD
    pub branch: Option<String>,
    pub signs: String,
}

pub trait RepoProbe {
    /// None when `cwd` is not inside a repository
    fn snapshot(&self, cwd: &Path) -> Option<GitSnapshot>;
}

/// Reads the repository with libgit2
#[derive(Debug, Clone, Copy, Default)]
pub struct Git2Probe;

impl RepoProbe for Git2Probe {
    fn snapshot(&self, cwd: &Path) -> Option<GitSnapshot> {
        let repo = Repository::discover(cwd).ok()?;
        if repo.is_bare() {
            return None;
        }
        let snapshot = GitSnapshot {
            branch: branch_name(&repo),
            signs: status_signs(&repo).unwrap_or_default(),
        };
        trace!(?snapshot, "git snapshot");
        Some(snapshot)
    }
}

/// Never finds a repository
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRepo;

impl RepoProbe for NoRepo {
    fn snapshot(&self, _cwd: &Path) -> Option<GitSnapshot> {
        None
    }
}

fn branch_name(repo: &Repository) -> Option<String> {
    match repo.head() {
        Ok(head) if head.is_branch() => head.shorthand().map(str::to_string),
        Ok(_) => None,
        // No commits yet: HEAD still names its branch
        Err(err) if err.code() == ErrorCode::UnbornBranch => unborn_branch(repo),
        Err(_) => None,
    }
}

fn unborn_branch(repo: &Repository) -> Option<String> {
    let head = repo.find_reference("HEAD").ok()?;
    let target = head.symbolic_target()?;
    target.strip_prefix("refs/heads/").map(str::to_string)
}

/// Signs in display order: `= + » ✘ ! ? ⇡ ⇣`
fn status_signs(repo: &Repository) -> Result<String, git2::Error> {
    let mut opts = StatusOptions::new();
    opts.include_untracked(true)
        .renames_head_to_index(true)
        .show(StatusShow::IndexAndWorkdir);
    let statuses = repo.statuses(Some(&mut opts))?;

    let mut seen = Status::empty();
    for entry in statuses.iter() {
        seen |= entry.status();
    }

    let staged = Status::INDEX_NEW | Status::INDEX_MODIFIED | Status::INDEX_TYPECHANGE;
    let renamed = Status::INDEX_RENAMED | Status::WT_RENAMED;
    let deleted = Status::INDEX_DELETED | Status::WT_DELETED;
    let modified = Status::WT_MODIFIED | Status::WT_TYPECHANGE;

    let mut signs = String::new();
    for (mask, sign) in [
        (Status::CONFLICTED, '='),
        (staged, '+'),
        (renamed, '»'),
        (deleted, '✘'),
        (modified, '!'),
        (Status::WT_NEW, '?'),
    ] {
        if seen.intersects(mask) {
            signs.push(sign);
        }
    }

    let (ahead, behind) = ahead_behind(repo).unwrap_or((0, 0));
    if ahead > 0 {
        signs.push('⇡');
    }
    if behind > 0 {
        signs.push('⇣');
    }
    Ok(signs)
}

fn ahead_behind(repo: &Repository) -> Option<(usize, usize)> {
    let head = repo.head().ok()?;
    let branch = repo.find_branch(head.shorthand()?, BranchType::Local).ok()?;
    let upstream = branch.upstream().ok()?;
    let local = head.target()?;
    let remote = upstream.get().target()?;
    repo.graph_ahead_behind(local, remote).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_outside_repository() {
        let dir = std::env::temp_dir().join(format!("ox-norepo-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        // temp_dir itself could sit inside a checkout; only assert when it does not
        if Repository::discover(&dir).is_err() {
            assert_eq!(Git2Probe.snapshot(&dir), None);
        }
        assert_eq!(NoRepo.snapshot(&dir), None);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_untracked_file_in_fresh_repository() {
        let dir = std::env::temp_dir().join(format!("ox-repo-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        Repository::init(&dir).unwrap();
        fs::write(dir.join("new.txt"), "x").unwrap();

        let snapshot = Git2Probe.snapshot(&dir).unwrap();
        assert!(snapshot.branch.is_some());
        assert_eq!(snapshot.signs, "?");
        fs::remove_dir_all(&dir).unwrap();
    }
}
