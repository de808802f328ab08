//! Least-recently-searched repository eviction
//!
//! The daemon wakes whenever a search bumps a repo's recency and deletes repos ranked
//! beyond `max_repos`. A candidate is re-ranked after taking its write lock, because a
//! search may have refreshed it in between.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::Result;
use crate::service::Service;
use crate::status::StatusHandle;
use crate::storage::sqlite::{delete_repo, repo_rank, select_eviction_candidate};

enum Eviction {
    /// Nothing ranks beyond the cutoff
    Done,
    Deleted(String),
    /// The candidate was refreshed or already deleted; select again
    Retry,
}

impl Service {
    /// Delete repos until at most `max_repos` remain. Returns the number deleted.
    pub async fn evict_once(&self) -> Result<usize> {
        let status = self.status.start("cleanup", None);
        let mut deleted = 0;
        loop {
            match self.try_delete_oldest_repo(&status).await? {
                Eviction::Done => return Ok(deleted),
                Eviction::Deleted(repo) => {
                    info!(%repo, "evicted repository");
                    deleted += 1;
                }
                Eviction::Retry => {}
            }
        }
    }

    async fn try_delete_oldest_repo(&self, status: &StatusHandle) -> Result<Eviction> {
        let max_repos = self.config.max_repos;

        status.task("select repo to delete");
        let candidate = select_eviction_candidate(&*self.store.read()?, max_repos)?;
        let Some((repo_id, repo)) = candidate else {
            return Ok(Eviction::Done);
        };

        let _wlock = self.locks.write(&repo, status.status()).await;

        status.task("recheck repo rank");
        let rank = repo_rank(&*self.store.read()?, repo_id)?;
        match rank {
            Some(rank) if rank > max_repos => {}
            _ => {
                debug!(%repo, ?rank, "eviction candidate changed, retrying");
                return Ok(Eviction::Retry);
            }
        }

        let _ilock = self.locks.index(&repo, status.status()).await;

        status.task("delete repo");
        {
            let mut conn = self.store.write();
            let tx = conn.transaction()?;
            delete_repo(&tx, repo_id)?;
            tx.commit()?;
        }
        Ok(Eviction::Deleted(repo))
    }

    pub(crate) async fn run_eviction_daemon(self: Arc<Self>, mut updates: mpsc::Receiver<()>) {
        loop {
            tokio::select! {
                _ = self.shutdown_token().cancelled() => break,
                update = updates.recv() => if update.is_none() {
                    break;
                },
            }
            if let Err(e) = self.evict_once().await {
                error!(error = %e, "eviction failed");
            }
        }
        debug!("eviction daemon stopped");
    }
}
