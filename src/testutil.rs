//! Test doubles: an in-memory linear git history and a line-based parser

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::config::RockskipConfig;
use crate::git::{
    ArchiveEntry, ArchiveStream, GitserverClient, LogEntry, LogStream, PathStatus, RepositoryFetcher, StatusAMD,
};
use crate::parser::{Parser, ParserFactory};
use crate::service::Service;
use crate::storage::SqliteStore;
use crate::symbol::ParsedSymbol;
use crate::{Error, Result};

struct MemoryCommit {
    hash: String,
    files: BTreeMap<String, String>,
    path_statuses: Vec<PathStatus>,
}

#[derive(Default)]
struct MemoryGitState {
    repos: Mutex<HashMap<String, Vec<MemoryCommit>>>,
    rev_list_calls: AtomicUsize,
    log_delay: Mutex<Duration>,
    log_failure: Mutex<Option<String>>,
    archive_failures: Mutex<HashMap<String, String>>,
}

/// Linear histories held in memory, oldest commit first
#[derive(Clone, Default)]
pub struct MemoryGit {
    state: Arc<MemoryGitState>,
}

impl MemoryGit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commit on top of `repo`: `Some(content)` writes a file, `None` deletes it. Returns the hash.
    pub fn commit(&self, repo: &str, changes: &[(&str, Option<&str>)]) -> String {
        let mut repos = self.state.repos.lock();
        let history = repos.entry(repo.to_string()).or_default();
        let mut files = history.last().map(|c| c.files.clone()).unwrap_or_default();

        let mut path_statuses = Vec::new();
        for (path, content) in changes {
            let previous = files.get(*path).cloned();
            match (previous, content) {
                (None, Some(content)) => {
                    path_statuses.push(PathStatus::new(*path, StatusAMD::Added));
                    files.insert(path.to_string(), content.to_string());
                }
                (Some(previous), Some(content)) if previous != *content => {
                    path_statuses.push(PathStatus::new(*path, StatusAMD::Modified));
                    files.insert(path.to_string(), content.to_string());
                }
                (Some(_), None) => {
                    path_statuses.push(PathStatus::new(*path, StatusAMD::Deleted));
                    files.remove(*path);
                }
                _ => {}
            }
        }

        let seed = format!("{repo}:{}", history.len());
        let hash = blake3::hash(seed.as_bytes()).to_hex()[..40].to_string();
        history.push(MemoryCommit {
            hash: hash.clone(),
            files,
            path_statuses,
        });
        hash
    }

    pub fn rev_list_calls(&self) -> usize {
        self.state.rev_list_calls.load(Ordering::SeqCst)
    }

    /// Delay every log walk, to keep indexing in flight
    pub fn set_log_delay(&self, delay: Duration) {
        *self.state.log_delay.lock() = delay;
    }

    /// Make every log walk fail with `message`
    pub fn fail_log(&self, message: &str) {
        *self.state.log_failure.lock() = Some(message.to_string());
    }

    /// Make archive fetches at `commit` fail with `message`
    pub fn fail_archive(&self, commit: &str, message: &str) {
        self.state
            .archive_failures
            .lock()
            .insert(commit.to_string(), message.to_string());
    }

    pub fn clear_failures(&self) {
        *self.state.log_failure.lock() = None;
        self.state.archive_failures.lock().clear();
    }

    /// Index of `commit` in `repo`'s history
    fn position(&self, repo: &str, commit: &str) -> Result<usize> {
        self.state
            .repos
            .lock()
            .get(repo)
            .and_then(|history| history.iter().position(|c| c.hash == commit))
            .ok_or_else(|| Error::Git(format!("unknown commit {repo}@{commit}")))
    }
}

#[async_trait]
impl GitserverClient for MemoryGit {
    async fn log_reverse_each(&self, repo: &str, commit: &str, n: usize) -> Result<LogStream> {
        let delay = *self.state.log_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = self.state.log_failure.lock().clone() {
            return Err(Error::Git(message));
        }

        let end = self.position(repo, commit)?;
        let entries: Vec<LogEntry> = {
            let repos = self.state.repos.lock();
            let history = &repos[repo];
            history[(end + 1).saturating_sub(n)..=end]
                .iter()
                .map(|c| LogEntry {
                    commit: c.hash.clone(),
                    path_statuses: c.path_statuses.clone(),
                })
                .collect()
        };

        let (tx, rx) = mpsc::channel(entries.len().max(1));
        for entry in entries {
            let _ = tx.try_send(Ok(entry));
        }
        Ok(rx)
    }

    async fn rev_list(
        &self,
        repo: &str,
        commit: &str,
        on_commit: &mut (dyn for<'h> FnMut(&'h str) -> Result<bool> + Send),
    ) -> Result<()> {
        self.state.rev_list_calls.fetch_add(1, Ordering::SeqCst);
        let end = self.position(repo, commit)?;
        let hashes: Vec<String> = {
            let repos = self.state.repos.lock();
            repos[repo][..=end].iter().rev().map(|c| c.hash.clone()).collect()
        };
        for hash in hashes {
            if !on_commit(&hash)? {
                break;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RepositoryFetcher for MemoryGit {
    async fn fetch_repository_archive(&self, repo: &str, commit: &str, paths: &[String]) -> Result<ArchiveStream> {
        if let Some(message) = self.state.archive_failures.lock().get(commit).cloned() {
            return Err(Error::Git(message));
        }
        let at = self.position(repo, commit)?;
        let entries: Vec<ArchiveEntry> = {
            let repos = self.state.repos.lock();
            let files = &repos[repo][at].files;
            paths
                .iter()
                .filter_map(|path| {
                    files.get(path).map(|content| ArchiveEntry {
                        path: path.clone(),
                        content: content.as_bytes().to_vec(),
                    })
                })
                .collect()
        };

        let (tx, rx) = mpsc::channel(entries.len().max(1));
        for entry in entries {
            let _ = tx.try_send(Ok(entry));
        }
        Ok(rx)
    }
}

/// One symbol per non-empty line: the last word is the name, a leading word the kind
pub struct LineParser;

#[async_trait]
impl Parser for LineParser {
    async fn parse(&mut self, _path: &str, content: &[u8]) -> Result<Vec<ParsedSymbol>> {
        let text = std::str::from_utf8(content).map_err(|e| Error::Parse(e.to_string()))?;
        let symbols = text
            .lines()
            .enumerate()
            .filter_map(|(i, line)| {
                let words: Vec<&str> = line.split_whitespace().collect();
                let name = words.last()?;
                let kind = if words.len() > 1 { words[0] } else { "symbol" };
                Some(ParsedSymbol::new(*name, i as u32 + 1, kind))
            })
            .collect();
        Ok(symbols)
    }
}

pub struct LineParserFactory;

#[async_trait]
impl ParserFactory for LineParserFactory {
    async fn create(&self) -> Result<Box<dyn Parser>> {
        Ok(Box::new(LineParser))
    }
}

/// A started service over a temp database, `git` and `LineParser`
pub fn test_service(git: MemoryGit, configure: impl FnOnce(&mut RockskipConfig)) -> (tempfile::TempDir, Arc<Service>) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = RockskipConfig {
        database: dir.path().join("rockskip.db"),
        ..Default::default()
    };
    configure(&mut config);

    let store = SqliteStore::open(&config.database, config.read_pool_size).unwrap();
    let git = Arc::new(git);
    let service = Service::start(config, store, git.clone(), git, Arc::new(LineParserFactory));
    (dir, service)
}
