//! Index request routing
//!
//! Searches that find their commit unindexed emit an index request. Requests for the same
//! `repo@commit` share one completion channel. Each repo is pinned to one worker queue so
//! a repo is never indexed by two workers at once, and a full queue fails fast.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

use crate::lock::lock_key;
use crate::service::Service;
use crate::{Error, Result};

/// Outcome of one index request; the error is rendered to text so it can be shared
pub type IndexOutcome = std::result::Result<(), String>;

/// Completion channel of an index request. Holds `None` until the worker finishes.
pub type IndexDone = watch::Receiver<Option<IndexOutcome>>;

pub struct IndexRequest {
    pub repo: String,
    pub commit: String,
    key: String,
    done: watch::Sender<Option<IndexOutcome>>,
}

pub struct IndexRouter {
    queues: Vec<mpsc::Sender<IndexRequest>>,
    pending: Mutex<HashMap<String, IndexDone>>,
}

impl IndexRouter {
    /// A router over `workers` queues of `queue_size` each, plus the receiving ends for the workers
    pub fn new(workers: usize, queue_size: usize) -> (Self, Vec<mpsc::Receiver<IndexRequest>>) {
        let (queues, receivers) = (0..workers.max(1))
            .map(|_| mpsc::channel(queue_size.max(1)))
            .unzip();
        let router = Self {
            queues,
            pending: Mutex::new(HashMap::new()),
        };
        (router, receivers)
    }

    /// Worker responsible for `repo`
    pub fn worker_for(&self, repo: &str) -> usize {
        lock_key(repo) as usize % self.queues.len()
    }

    /// Request indexing of `repo@commit`, joining an identical in-flight request if there is one.
    pub fn emit(&self, repo: &str, commit: &str) -> Result<IndexDone> {
        let key = format!("{repo}@{commit}");
        let mut pending = self.pending.lock();
        if let Some(done) = pending.get(&key) {
            debug!(%key, "joining pending index request");
            return Ok(done.clone());
        }

        let (done_tx, done_rx) = watch::channel(None);
        let request = IndexRequest {
            repo: repo.to_string(),
            commit: commit.to_string(),
            key: key.clone(),
            done: done_tx,
        };
        match self.queues[self.worker_for(repo)].try_send(request) {
            Ok(()) => {
                pending.insert(key, done_rx.clone());
                Ok(done_rx)
            }
            Err(mpsc::error::TrySendError::Full(_)) => Err(Error::QueueFull(repo.to_string())),
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(Error::IndexingFailed("index workers have stopped".to_string()))
            }
        }
    }

    /// Publish a request's outcome and forget it
    fn complete(&self, request: IndexRequest, outcome: IndexOutcome) {
        request.done.send_replace(Some(outcome));
        self.pending.lock().remove(&request.key);
    }

    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }
}

impl Service {
    pub(crate) async fn run_index_worker(self: Arc<Self>, worker: usize, mut queue: mpsc::Receiver<IndexRequest>) {
        debug!(worker, "index worker started");
        loop {
            let request = tokio::select! {
                _ = self.shutdown_token().cancelled() => break,
                request = queue.recv() => match request {
                    Some(request) => request,
                    None => break,
                },
            };

            let outcome = self
                .index(self.shutdown_token(), &request.repo, &request.commit)
                .await
                .map_err(|e| {
                    error!(worker, repo = %request.repo, commit = %request.commit, error = %e, "indexing failed");
                    e.to_string()
                });
            self.router.complete(request, outcome);
        }
        info!(worker, "index worker stopped");
    }
}
