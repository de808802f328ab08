//! Git collaborators
//!
//! Indexing and search consume history and file contents through two traits:
//! - `GitserverClient`: first-parent history walks (`rev-list`, reverse `log` with path statuses)
//! - `RepositoryFetcher`: file contents at a commit
//!
//! `CliGit` implements both over local clones with the `git` executable.

pub mod cli;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::Result;

pub use cli::CliGit;

/// How a commit changed a path, relative to its first parent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusAMD {
    Added,
    Modified,
    Deleted,
}

impl StatusAMD {
    /// Map a `git --name-status` letter. Type changes count as modifications.
    pub fn from_letter(letter: char) -> Option<Self> {
        match letter {
            'A' => Some(StatusAMD::Added),
            'M' | 'T' => Some(StatusAMD::Modified),
            'D' => Some(StatusAMD::Deleted),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathStatus {
    pub path: String,
    pub status: StatusAMD,
}

impl PathStatus {
    pub fn new(path: impl Into<String>, status: StatusAMD) -> Self {
        Self { path: path.into(), status }
    }
}

/// One commit of a reverse log walk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub commit: String,
    pub path_statuses: Vec<PathStatus>,
}

/// Contents of one file at a commit
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub path: String,
    pub content: Vec<u8>,
}

/// Oldest-first log entries
pub type LogStream = mpsc::Receiver<Result<LogEntry>>;

/// File contents, in no particular order
pub type ArchiveStream = mpsc::Receiver<Result<ArchiveEntry>>;

#[async_trait]
pub trait GitserverClient: Send + Sync {
    /// The `n` most recent first-parent commits ending at `commit`, oldest first.
    async fn log_reverse_each(&self, repo: &str, commit: &str, n: usize) -> Result<LogStream>;

    /// Walk first-parent history from `commit` (newest first) until `on_commit` returns `false`.
    async fn rev_list(
        &self,
        repo: &str,
        commit: &str,
        on_commit: &mut (dyn for<'h> FnMut(&'h str) -> Result<bool> + Send),
    ) -> Result<()>;
}

#[async_trait]
pub trait RepositoryFetcher: Send + Sync {
    /// Stream the contents of `paths` at `commit`. Paths missing at that commit are skipped.
    async fn fetch_repository_archive(&self, repo: &str, commit: &str, paths: &[String]) -> Result<ArchiveStream>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_letters() {
        assert_eq!(StatusAMD::from_letter('A'), Some(StatusAMD::Added));
        assert_eq!(StatusAMD::from_letter('T'), Some(StatusAMD::Modified));
        assert_eq!(StatusAMD::from_letter('D'), Some(StatusAMD::Deleted));
        assert_eq!(StatusAMD::from_letter('U'), None);
    }

    #[tokio::test]
    async fn test_rev_list_stops_when_callback_declines() {
        let git = crate::testutil::MemoryGit::new();
        let first = git.commit("r", &[("a.go", Some("foo\n"))]);
        let second = git.commit("r", &[("a.go", Some("bar\n"))]);
        let third = git.commit("r", &[("a.go", Some("baz\n"))]);

        let mut seen = Vec::new();
        let mut on_commit = |hash: &str| -> Result<bool> {
            seen.push(hash.to_string());
            Ok(hash != second)
        };
        git.rev_list("r", &third, &mut on_commit).await.unwrap();
        assert_eq!(seen, vec![third.clone(), second.clone()]);
        assert!(!seen.contains(&first));
    }
}
