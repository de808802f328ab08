//! Incremental indexing
//!
//! `Service::index` brings a repo's ancestry and symbol tables up to a commit. Missing
//! first-parent commits are applied oldest first, one transaction each:
//! 1. insert the commit with its sparse ancestor pointer
//! 2. carry `added`/`deleted` tails forward over the skipped part of the spine
//! 3. delete names that vanished from deleted/modified paths
//! 4. insert names that appeared in added/modified paths
//! 5. prune hops that ended up in both `added` and `deleted`

pub mod cache;
pub mod hops;

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::git::{LogEntry, StatusAMD};
use crate::parser::Parser;
use crate::service::Service;
use crate::status::StatusHandle;
use crate::storage::sqlite::{
    append_hop, delete_redundant, ensure_repo, get_commit_by_hash, get_symbol, get_symbols_in_files, insert_commit,
    insert_symbol, update_symbol_hops,
};
use crate::storage::{HopStatus, NULL_COMMIT};
use crate::{Error, Result};

use cache::{PathSymbolsCache, SymbolIdCache};
use hops::{get_hops, ruler};

/// Names to delete and to insert, per path
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SymbolChanges {
    pub deleted: BTreeMap<String, BTreeSet<String>>,
    pub added: BTreeMap<String, BTreeSet<String>>,
}

/// Diff old and new name sets according to each path's status.
///
/// Deleted paths lose every old name, added paths gain every new name, modified paths
/// lose `old - new` and gain `new - old`.
pub fn symbol_changes(
    entry: &LogEntry,
    old: &HashMap<String, HashSet<String>>,
    new: &HashMap<String, HashSet<String>>,
) -> SymbolChanges {
    let empty = HashSet::new();
    let mut changes = SymbolChanges::default();
    for ps in &entry.path_statuses {
        let before = old.get(&ps.path).unwrap_or(&empty);
        let after = new.get(&ps.path).unwrap_or(&empty);
        let (gone, fresh): (BTreeSet<String>, BTreeSet<String>) = match ps.status {
            StatusAMD::Deleted => (before.iter().cloned().collect(), BTreeSet::new()),
            StatusAMD::Added => (BTreeSet::new(), after.iter().cloned().collect()),
            StatusAMD::Modified => (
                before.difference(after).cloned().collect(),
                after.difference(before).cloned().collect(),
            ),
        };
        if !gone.is_empty() {
            changes.deleted.entry(ps.path.clone()).or_default().extend(gone);
        }
        if !fresh.is_empty() {
            changes.added.entry(ps.path.clone()).or_default().extend(fresh);
        }
    }
    changes
}

/// State of one `index` call: the moving tip plus caches and a parser
struct IndexRun<'a> {
    service: &'a Service,
    repo: &'a str,
    repo_id: i64,
    status: &'a StatusHandle,
    parser: Box<dyn Parser>,
    symbol_ids: SymbolIdCache,
    path_symbols: PathSymbolsCache,
    tip_id: i64,
    tip_height: i64,
}

impl IndexRun<'_> {
    /// Parse the new contents of added and modified paths
    async fn parse_paths(&mut self, commit: &str, paths: &[String]) -> Result<HashMap<String, HashSet<String>>> {
        let mut parsed: HashMap<String, HashSet<String>> = paths.iter().map(|p| (p.clone(), HashSet::new())).collect();
        if paths.is_empty() {
            return Ok(parsed);
        }

        self.status.task("ArchiveEach");
        let mut archive = self
            .service
            .fetcher
            .fetch_repository_archive(self.repo, commit, paths)
            .await?;
        while let Some(file) = archive.recv().await {
            let file = file?;
            self.status.task("parse");
            let symbols = self.parser.parse(&file.path, &file.content).await?;
            parsed.insert(file.path, symbols.into_iter().map(|s| s.name).collect());
            self.status.task("ArchiveEach");
        }
        Ok(parsed)
    }

    async fn index_commit(&mut self, entry: &LogEntry) -> Result<()> {
        let mut old_paths = Vec::new();
        let mut new_paths = Vec::new();
        for ps in &entry.path_statuses {
            match ps.status {
                StatusAMD::Deleted => old_paths.push(ps.path.clone()),
                StatusAMD::Added => new_paths.push(ps.path.clone()),
                StatusAMD::Modified => {
                    old_paths.push(ps.path.clone());
                    new_paths.push(ps.path.clone());
                }
            }
        }

        let mut old: HashMap<String, HashSet<String>> = HashMap::new();
        let mut uncached = Vec::new();
        for path in old_paths {
            match self.path_symbols.get(&path) {
                Some(names) => {
                    old.insert(path, names);
                }
                None => uncached.push(path),
            }
        }

        let new = self.parse_paths(&entry.commit, &new_paths).await?;

        self.status.task("InsertCommit");
        let height = self.tip_height + 1;
        let commit_id = {
            let mut conn = self.service.store.write();
            let tx = conn.transaction()?;

            let hops = get_hops(&tx, self.tip_id)?;
            let r = ruler(height);
            if r >= hops.len() {
                return Err(Error::Ruler {
                    height,
                    ruler: r,
                    hops: hops.len(),
                });
            }
            let commit_id = insert_commit(&tx, self.repo_id, &entry.commit, height, hops[r])?;

            append_hop(&tx, self.repo_id, &hops[..r], HopStatus::Added, commit_id)?;
            append_hop(&tx, self.repo_id, &hops[..r], HopStatus::Deleted, commit_id)?;

            old.extend(get_symbols_in_files(&tx, self.repo_id, &uncached, &hops)?);
            let changes = symbol_changes(entry, &old, &new);

            for (path, names) in &changes.deleted {
                for name in names {
                    let id = match self.symbol_ids.get(path, name) {
                        Some(id) => Some(id),
                        None => get_symbol(&tx, self.repo_id, path, name, &hops)?,
                    };
                    let Some(id) = id else {
                        error!(repo = %self.repo, commit = %entry.commit, %path, %name, "could not find symbol to delete");
                        continue;
                    };
                    update_symbol_hops(&tx, id, HopStatus::Deleted, commit_id)?;
                }
            }

            for (path, names) in &changes.added {
                for name in names {
                    let id = insert_symbol(&tx, self.repo_id, path, name, commit_id)?;
                    self.symbol_ids.set(path, name, id);
                }
            }

            let pruned = delete_redundant(&tx, self.repo_id, commit_id)?;
            tx.commit()?;
            debug!(
                repo = %self.repo,
                commit = %entry.commit,
                height,
                ancestor = hops[r],
                deleted = changes.deleted.values().map(BTreeSet::len).sum::<usize>(),
                added = changes.added.values().map(BTreeSet::len).sum::<usize>(),
                pruned,
                "indexed commit"
            );
            commit_id
        };

        for ps in &entry.path_statuses {
            if ps.status == StatusAMD::Deleted {
                self.path_symbols.remove(&ps.path);
            }
        }
        for (path, names) in new {
            self.path_symbols.set(&path, names);
        }
        self.tip_id = commit_id;
        self.tip_height = height;
        Ok(())
    }
}

impl Service {
    /// Index `commit` of `repo` and every missing first-parent ancestor. Idempotent.
    pub async fn index(&self, cancel: &CancellationToken, repo: &str, commit: &str) -> Result<()> {
        let status = self.status.start(format!("indexing {repo}@{commit}"), Some(repo));

        let _ilock = tokio::select! {
            lock = self.locks.index(repo, status.status()) => lock,
            _ = cancel.cancelled() => return Err(Error::Cancelled),
        };

        let repo_id = ensure_repo(&self.store.write(), repo)?;

        status.task("RevList");
        let mut tip = None;
        let mut missing = 0usize;
        {
            let conn = self.store.read()?;
            let tip = &mut tip;
            let missing = &mut missing;
            let mut on_commit = move |hash: &str| -> Result<bool> {
                match get_commit_by_hash(&conn, repo_id, hash)? {
                    Some(node) => {
                        *tip = Some(node);
                        Ok(false)
                    }
                    None => {
                        *missing += 1;
                        Ok(true)
                    }
                }
            };
            self.git.rev_list(repo, commit, &mut on_commit).await?;
        }

        if missing == 0 {
            debug!(repo, commit, "already indexed");
            return Ok(());
        }

        let (tip_id, tip_height) = tip.map(|node| (node.id, node.height)).unwrap_or((NULL_COMMIT, 0));
        info!(repo, commit, missing, tip_height, "indexing");
        status.set_progress(0, missing);

        let parser = self.parser_factory.create().await?;
        let mut run = IndexRun {
            service: self,
            repo,
            repo_id,
            status: &status,
            parser,
            symbol_ids: SymbolIdCache::new(self.config.symbols_cache_size),
            path_symbols: PathSymbolsCache::new(self.config.path_symbols_cache_size),
            tip_id,
            tip_height,
        };

        status.task("Log");
        let mut log = self.git.log_reverse_each(repo, commit, missing).await?;
        let mut indexed = 0usize;
        while let Some(entry) = log.recv().await {
            let entry = entry?;
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            run.index_commit(&entry).await?;
            indexed += 1;
            status.set_progress(indexed, missing);
            status.task("Log");
        }

        info!(repo, commit, indexed, "finished indexing");
        Ok(())
    }
}
