//! The Rockskip service
//!
//! One `Service` owns the store, the lock table, the status registry, the index router and
//! the git/parser collaborators. It is built once, shared by `Arc`, and its background
//! tasks (index workers, eviction daemon) run until `shutdown`.

use std::fmt::Write as _;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::RockskipConfig;
use crate::git::{GitserverClient, RepositoryFetcher};
use crate::lock::LockManager;
use crate::parser::ParserFactory;
use crate::router::IndexRouter;
use crate::status::StatusRegistry;
use crate::storage::sqlite::list_repos;
use crate::storage::{DbStats, SqliteStore};
use crate::Result;

pub struct Service {
    pub(crate) config: RockskipConfig,
    pub(crate) store: SqliteStore,
    pub(crate) locks: LockManager,
    pub(crate) status: Arc<StatusRegistry>,
    pub(crate) router: IndexRouter,
    pub(crate) git: Arc<dyn GitserverClient>,
    pub(crate) fetcher: Arc<dyn RepositoryFetcher>,
    pub(crate) parser_factory: Arc<dyn ParserFactory>,
    /// Coalesced "a repo was searched" signal for the eviction daemon
    repo_updates: mpsc::Sender<()>,
    shutdown: CancellationToken,
}

impl Service {
    /// Build the service and spawn its index workers and eviction daemon.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        config: RockskipConfig,
        store: SqliteStore,
        git: Arc<dyn GitserverClient>,
        fetcher: Arc<dyn RepositoryFetcher>,
        parser_factory: Arc<dyn ParserFactory>,
    ) -> Arc<Self> {
        let (router, queues) = IndexRouter::new(config.index_workers, config.index_queue_size);
        let (repo_updates, updates_rx) = mpsc::channel(1);

        let service = Arc::new(Self {
            config,
            store,
            locks: LockManager::new(),
            status: StatusRegistry::new(),
            router,
            git,
            fetcher,
            parser_factory,
            repo_updates,
            shutdown: CancellationToken::new(),
        });

        for (worker, queue) in queues.into_iter().enumerate() {
            tokio::spawn(service.clone().run_index_worker(worker, queue));
        }
        tokio::spawn(service.clone().run_eviction_daemon(updates_rx));

        info!(
            workers = service.config.index_workers,
            max_repos = service.config.max_repos,
            database = %service.store.db_path().display(),
            "rockskip service started"
        );
        service
    }

    pub fn config(&self) -> &RockskipConfig {
        &self.config
    }

    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    /// Stop background tasks. In-flight index runs stop before their next commit.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub(crate) fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Wake the eviction daemon. A pending wakeup absorbs this one.
    pub(crate) fn signal_repo_update(&self) {
        let _ = self.repo_updates.try_send(());
    }

    pub fn stats(&self) -> Result<DbStats> {
        self.store.stats()
    }

    /// Plain-text status page: table sizes, tracked repos and in-flight requests
    pub fn status_page(&self) -> Result<String> {
        let stats = self.store.stats()?;
        let repos = list_repos(&*self.store.read()?)?;

        let mut page = String::new();
        let _ = writeln!(page, "This is the status page for Rockskip.");
        let _ = writeln!(page);
        let _ = writeln!(page, "Repositories: {} (max {})", stats.repos, self.config.max_repos);
        let _ = writeln!(page, "Commits indexed: {}", stats.commits);
        let _ = writeln!(page, "Symbol rows: {}", stats.symbols);
        let _ = writeln!(page, "Database: {}", self.store.db_path().display());
        let _ = writeln!(page);
        if !repos.is_empty() {
            let _ = writeln!(page, "Most recently searched repositories:");
            for repo in repos.iter().take(20) {
                let accessed = chrono::DateTime::from_timestamp_micros(repo.last_accessed_at)
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| repo.last_accessed_at.to_string());
                let _ = writeln!(page, "  {} (last searched {})", repo.name, accessed);
            }
            let _ = writeln!(page);
        }
        page.push_str(&self.status.render());
        Ok(page)
    }
}
