//! Query engine implementation
//!
//! A search runs in three phases:
//! - Resolve: find the commit in the ancestry table, indexing it on demand
//! - Narrow: select paths with a matching visible symbol row in SQL
//! - Validate: parse each candidate at the searched commit and re-check with `regex`

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{SearchMode, SearchOutcome, SearchParameters, SymbolMatcher, search_predicate};
use crate::index::hops::get_hops;
use crate::service::Service;
use crate::status::StatusHandle;
use crate::storage::CommitNode;
use crate::storage::sqlite::{find_candidate_paths, get_commit_by_hash, update_last_accessed_at};
use crate::symbol::Symbol;
use crate::{Error, Result};

impl Service {
    /// Symbols matching `params` at the requested commit
    pub async fn search(&self, cancel: &CancellationToken, params: SearchParameters) -> Result<Vec<Symbol>> {
        Ok(self.search_with_outcome(cancel, params).await?.symbols)
    }

    /// Like `search`, also reporting which commit was searched
    pub async fn search_with_outcome(&self, cancel: &CancellationToken, params: SearchParameters) -> Result<SearchOutcome> {
        let status = self.status.start(
            format!("searching {}@{} for {:?}", params.repo, params.commit_id, params.query),
            Some(&params.repo),
        );

        let work = self.search_inner(cancel, &params, &status);
        let outcome = match params.timeout {
            Some(timeout) if !timeout.is_zero() => match tokio::time::timeout(timeout, work).await {
                Ok(outcome) => outcome,
                Err(_) => Err(Error::Timeout(self.timeout_message(&params.repo, status.id))),
            },
            _ => work.await,
        };

        if let Ok(outcome) = &outcome {
            debug!(
                repo = %params.repo,
                commit = %outcome.searched_commit,
                approximate = outcome.approximate,
                results = outcome.symbols.len(),
                "search finished"
            );
        }
        outcome
    }

    /// Other in-flight work on `repo`, excluding the timed-out search itself
    fn timeout_message(&self, repo: &str, own_status: u64) -> String {
        let statuses = self.status.repo_status(repo, Some(own_status));
        let detail = if statuses.is_empty() {
            "no indexing in progress".to_string()
        } else {
            statuses.join("; ")
        };
        format!("Processing symbols is taking a while, try again later ({detail})")
    }

    async fn search_inner(
        &self,
        cancel: &CancellationToken,
        params: &SearchParameters,
        status: &StatusHandle,
    ) -> Result<SearchOutcome> {
        let repo = params.repo.as_str();
        let matcher = SymbolMatcher::new(params)?;

        let _rlock = self
            .locks
            .try_read(repo, status.status())
            .ok_or_else(|| Error::DeletionInProgress(repo.to_string()))?;

        status.task("update last_accessed_at");
        let repo_id = update_last_accessed_at(&self.store.write(), repo)?;
        self.signal_repo_update();

        status.task("check commit presence");
        let found = get_commit_by_hash(&*self.store.read()?, repo_id, &params.commit_id)?;
        let (commit, approximate) = match found {
            Some(node) => (node, false),
            None => self.resolve_unindexed(cancel, params, repo_id, status).await?,
        };

        let symbols = self.query_symbols(cancel, params, &matcher, repo_id, &commit, status).await?;
        Ok(SearchOutcome {
            symbols,
            searched_commit: commit.commit_hash,
            approximate,
        })
    }

    /// Index the requested commit; in approximate mode fall back to its nearest indexed ancestor
    async fn resolve_unindexed(
        &self,
        cancel: &CancellationToken,
        params: &SearchParameters,
        repo_id: i64,
        status: &StatusHandle,
    ) -> Result<(CommitNode, bool)> {
        let repo = params.repo.as_str();
        let commit = params.commit_id.as_str();

        status.task("emit index request");
        let mut done = self.router.emit(repo, commit)?;

        if params.mode.unwrap_or(self.config.default_search_mode()) == SearchMode::NearestIndexedAncestor {
            status.task("find nearest indexed ancestor");
            if let Some(ancestor) = self.nearest_indexed_ancestor(repo, repo_id, commit).await? {
                info!(repo, commit, searched = %ancestor.commit_hash, "searching nearest indexed ancestor");
                return Ok((ancestor, true));
            }
        }

        status.task("await indexing completion");
        let outcome = tokio::select! {
            outcome = done.wait_for(Option::is_some) => outcome.map(|outcome| (*outcome).clone()),
            _ = cancel.cancelled() => return Err(Error::Cancelled),
        };

        status.task("recheck commit presence");
        let found = get_commit_by_hash(&*self.store.read()?, repo_id, commit)?;
        match (found, outcome) {
            (Some(node), _) => Ok((node, false)),
            (None, Ok(Some(Err(error)))) => Err(Error::IndexingFailed(error)),
            (None, Ok(_)) => Err(Error::IndexingFailed(format!("{commit} was not indexed"))),
            (None, Err(_)) => Err(Error::IndexingFailed("index worker stopped".to_string())),
        }
    }

    /// The newest indexed commit on the first-parent history of `commit`
    async fn nearest_indexed_ancestor(&self, repo: &str, repo_id: i64, commit: &str) -> Result<Option<CommitNode>> {
        let mut nearest = None;
        {
            let conn = self.store.read()?;
            let nearest = &mut nearest;
            let mut on_commit = move |hash: &str| -> Result<bool> {
                *nearest = get_commit_by_hash(&conn, repo_id, hash)?;
                Ok(nearest.is_none())
            };
            self.git.rev_list(repo, commit, &mut on_commit).await?;
        }
        Ok(nearest)
    }

    async fn query_symbols(
        &self,
        cancel: &CancellationToken,
        params: &SearchParameters,
        matcher: &SymbolMatcher,
        repo_id: i64,
        commit: &CommitNode,
        status: &StatusHandle,
    ) -> Result<Vec<Symbol>> {
        let limit = params.limit();
        let predicate = search_predicate(
            &params.name_pattern(),
            &params.include_patterns,
            &params.exclude_pattern,
            params.is_case_sensitive,
        )?;

        status.task("run query");
        let paths = {
            let conn = self.store.read()?;
            let mut hops = get_hops(&conn, commit.id)?;
            hops.pop();
            let filter = predicate.as_ref().map(|p| (p.sql.as_str(), p.params.as_slice()));
            find_candidate_paths(&conn, repo_id, &hops, filter, limit)?
        };
        debug!(repo = %params.repo, commit = %commit.commit_hash, candidates = paths.len(), "candidate paths");
        if paths.is_empty() {
            return Ok(Vec::new());
        }

        let mut parser = self.parser_factory.create().await?;
        status.task("ArchiveEach");
        let mut archive = self
            .fetcher
            .fetch_repository_archive(&params.repo, &commit.commit_hash, &paths)
            .await?;

        let mut symbols = Vec::new();
        'files: while let Some(file) = archive.recv().await {
            let file = file?;
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            if !matcher.matches_path(&file.path) {
                continue;
            }
            status.task("parse");
            let parsed = parser.parse(&file.path, &file.content).await?;
            let contents = String::from_utf8_lossy(&file.content);
            for symbol in parsed {
                if !matcher.matches_name(&symbol.name) {
                    continue;
                }
                symbols.push(Symbol::from_parsed(&file.path, symbol, &contents));
                if symbols.len() >= limit {
                    break 'files;
                }
            }
            status.task("ArchiveEach");
        }
        Ok(symbols)
    }
}
