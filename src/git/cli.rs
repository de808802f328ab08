//! `git` subprocess implementation of the git collaborators

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use super::{
    ArchiveEntry, ArchiveStream, GitserverClient, LogEntry, LogStream, PathStatus, RepositoryFetcher, StatusAMD,
};
use crate::{Error, Result};

const CHANNEL_SIZE: usize = 64;

/// Serves repositories cloned under `repos_root/<repo name>`
#[derive(Debug, Clone)]
pub struct CliGit {
    repos_root: PathBuf,
}

impl CliGit {
    pub fn new(repos_root: impl Into<PathBuf>) -> Self {
        Self { repos_root: repos_root.into() }
    }

    fn repo_dir(&self, repo: &str) -> Result<PathBuf> {
        if repo.is_empty() || repo.split('/').any(|part| part == ".." || part.is_empty()) {
            return Err(Error::Git(format!("invalid repo name {repo:?}")));
        }
        Ok(self.repos_root.join(repo))
    }

    fn command(dir: &Path) -> Command {
        let mut cmd = Command::new("git");
        cmd.arg("-C")
            .arg(dir)
            .args(["-c", "core.quotepath=off"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

fn check_revision(commit: &str) -> Result<()> {
    if commit.is_empty() || commit.starts_with('-') {
        return Err(Error::Git(format!("invalid commit {commit:?}")));
    }
    Ok(())
}

async fn finish(mut child: Child, what: &str) -> Result<()> {
    let mut stderr = String::new();
    if let Some(mut pipe) = child.stderr.take() {
        pipe.read_to_string(&mut stderr).await?;
    }
    let status = child.wait().await?;
    if !status.success() {
        return Err(Error::Git(format!("git {what} failed ({status}): {}", stderr.trim())));
    }
    Ok(())
}

/// Undo git's C-style quoting of unusual paths
fn unquote_path(raw: &str) -> String {
    let Some(inner) = raw.strip_prefix('"').and_then(|s| s.strip_suffix('"')) else {
        return raw.to_string();
    };
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// Incremental parser for `git log --format='commit %H' --name-status` output
#[derive(Debug, Default)]
struct LogParser {
    current: Option<LogEntry>,
}

impl LogParser {
    /// Feed one line; returns an entry when the previous one is complete
    fn line(&mut self, line: &str) -> Option<LogEntry> {
        if let Some(hash) = line.strip_prefix("commit ") {
            let next = LogEntry {
                commit: hash.trim().to_string(),
                path_statuses: Vec::new(),
            };
            return self.current.replace(next);
        }
        let Some((letter, path)) = line.split_once('\t') else {
            return None;
        };
        let (Some(entry), Some(status)) = (
            self.current.as_mut(),
            letter.chars().next().and_then(StatusAMD::from_letter),
        ) else {
            return None;
        };
        entry.path_statuses.push(PathStatus::new(unquote_path(path), status));
        None
    }

    fn finish(&mut self) -> Option<LogEntry> {
        self.current.take()
    }
}

#[async_trait]
impl GitserverClient for CliGit {
    async fn log_reverse_each(&self, repo: &str, commit: &str, n: usize) -> Result<LogStream> {
        check_revision(commit)?;
        let dir = self.repo_dir(repo)?;
        let mut child = Self::command(&dir)
            .args([
                "log",
                "--format=commit %H",
                "--name-status",
                "--no-renames",
                "--first-parent",
                "--diff-merges=first-parent",
                "--reverse",
                "--ignore-submodules",
            ])
            .arg(format!("-n{n}"))
            .arg(commit)
            .arg("--")
            .spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Git("git log has no stdout".to_string()))?;

        let (tx, rx) = mpsc::channel(CHANNEL_SIZE);
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            let mut parser = LogParser::default();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if let Some(entry) = parser.line(&line) {
                            if tx.send(Ok(entry)).await.is_err() {
                                return;
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        let _ = tx.send(Err(e.into())).await;
                        return;
                    }
                }
            }
            if let Err(e) = finish(child, "log").await {
                let _ = tx.send(Err(e)).await;
                return;
            }
            if let Some(entry) = parser.finish() {
                let _ = tx.send(Ok(entry)).await;
            }
        });
        Ok(rx)
    }

    async fn rev_list(
        &self,
        repo: &str,
        commit: &str,
        on_commit: &mut (dyn for<'h> FnMut(&'h str) -> Result<bool> + Send),
    ) -> Result<()> {
        check_revision(commit)?;
        let dir = self.repo_dir(repo)?;
        let mut child = Self::command(&dir)
            .args(["rev-list", "--first-parent", commit, "--"])
            .spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Git("git rev-list has no stdout".to_string()))?;

        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await? {
            let hash = line.trim();
            if hash.is_empty() {
                continue;
            }
            if !on_commit(hash)? {
                // dropping the child kills it
                return Ok(());
            }
        }
        finish(child, "rev-list").await
    }
}

#[async_trait]
impl RepositoryFetcher for CliGit {
    async fn fetch_repository_archive(&self, repo: &str, commit: &str, paths: &[String]) -> Result<ArchiveStream> {
        check_revision(commit)?;
        let dir = self.repo_dir(repo)?;
        let mut child = Self::command(&dir)
            .args(["cat-file", "--batch"])
            .stdin(Stdio::piped())
            .spawn()?;
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Git("git cat-file has no stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Git("git cat-file has no stdout".to_string()))?;

        let commit = commit.to_string();
        let paths = paths.to_vec();
        let (tx, rx) = mpsc::channel(CHANNEL_SIZE);
        tokio::spawn(async move {
            let mut reader = BufReader::new(stdout);
            for path in paths {
                if path.contains('\n') {
                    tracing::warn!(%path, "skipping path with a newline");
                    continue;
                }
                match read_blob(&mut stdin, &mut reader, &commit, &path).await {
                    Ok(Some(content)) => {
                        if tx.send(Ok(ArchiveEntry { path, content })).await.is_err() {
                            return;
                        }
                    }
                    Ok(None) => tracing::debug!(%path, %commit, "path missing at commit"),
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                }
            }
            drop(stdin);
            if let Err(e) = finish(child, "cat-file").await {
                let _ = tx.send(Err(e)).await;
            }
        });
        Ok(rx)
    }
}

async fn read_blob<W, R>(stdin: &mut W, reader: &mut R, commit: &str, path: &str) -> Result<Option<Vec<u8>>>
where
    W: AsyncWriteExt + Unpin,
    R: AsyncBufReadExt + Unpin,
{
    stdin.write_all(format!("{commit}:{path}\n").as_bytes()).await?;
    stdin.flush().await?;

    let mut header = String::new();
    reader.read_line(&mut header).await?;
    let parts: Vec<&str> = header.split_whitespace().collect();
    match parts.as_slice() {
        [_, kind, size] => {
            let size: usize = size
                .parse()
                .map_err(|_| Error::Git(format!("bad cat-file header {header:?}")))?;
            let mut content = vec![0u8; size];
            reader.read_exact(&mut content).await?;
            let mut newline = [0u8; 1];
            reader.read_exact(&mut newline).await?;
            Ok((*kind == "blob").then_some(content))
        }
        [.., "missing"] | [.., "ambiguous"] => Ok(None),
        _ => Err(Error::Git(format!("bad cat-file header {header:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_parser_groups_path_statuses() {
        let output = "commit aaa\n\nA\tsrc/main.go\nA\tREADME.md\ncommit bbb\n\nM\tsrc/main.go\nD\tREADME.md\nT\tlink\n";
        let mut parser = LogParser::default();
        let mut entries: Vec<LogEntry> = output.lines().filter_map(|l| parser.line(l)).collect();
        entries.extend(parser.finish());

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].commit, "aaa");
        assert_eq!(entries[0].path_statuses.len(), 2);
        assert_eq!(
            entries[1].path_statuses,
            vec![
                PathStatus::new("src/main.go", StatusAMD::Modified),
                PathStatus::new("README.md", StatusAMD::Deleted),
                PathStatus::new("link", StatusAMD::Modified),
            ]
        );
    }

    #[test]
    fn test_unquote_path() {
        assert_eq!(unquote_path("plain.go"), "plain.go");
        assert_eq!(unquote_path("\"tab\\there.go\""), "tab\there.go");
        assert_eq!(unquote_path("\"q\\\"uote.go\""), "q\"uote.go");
    }

    #[test]
    fn test_repo_names_cannot_escape_root() {
        let git = CliGit::new("/srv/repos");
        assert!(git.repo_dir("github.com/a/b").is_ok());
        assert!(git.repo_dir("../etc").is_err());
        assert!(git.repo_dir("").is_err());
        assert!(check_revision("--output=x").is_err());
    }

    #[tokio::test]
    async fn test_read_blob_parses_batch_output() {
        let output = b"0123 blob 5\nhello\nmissing.txt missing\n".to_vec();
        let mut reader = BufReader::new(std::io::Cursor::new(output));
        let mut sink = Vec::new();

        let found = read_blob(&mut sink, &mut reader, "HEAD", "a.txt").await.unwrap();
        assert_eq!(found.as_deref(), Some(&b"hello"[..]));
        let missing = read_blob(&mut sink, &mut reader, "HEAD", "missing.txt").await.unwrap();
        assert!(missing.is_none());
        assert_eq!(sink, b"HEAD:a.txt\nHEAD:missing.txt\n");
    }
}
