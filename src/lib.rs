//! # Rockskip - Incremental symbol index over git history
//!
//! Rockskip keeps, per repository, a database of symbol occurrences across every indexed
//! commit. A symbol query at any commit is answered from that database without re-parsing
//! the repository and without storing a full symbol snapshot per commit.
//!
//! Rockskip provides:
//! - A sparse ancestry skip list (one ancestor pointer per commit, chosen by the ruler sequence)
//! - Symbol rows tagged with `added`/`deleted` hop sets for visibility checks
//! - Incremental, commit-by-commit indexing driven by `git log` path statuses
//! - Per-repository read/write/index locks, request deduplication and worker routing
//! - Bounded storage through least-recently-searched repository eviction

pub mod config;
pub mod symbol;
pub mod storage;
pub mod lock;
pub mod git;
pub mod parser;
pub mod index;
pub mod router;
pub mod query;
pub mod evict;
pub mod status;
pub mod service;
pub mod server;

#[cfg(test)]
mod testutil;

// Re-exports for convenient access
pub use config::RockskipConfig;
pub use symbol::{ParsedSymbol, Symbol};
pub use storage::SqliteStore;
pub use query::{SearchMode, SearchOutcome, SearchParameters};
pub use service::Service;

/// Result type alias for Rockskip operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Rockskip operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid regex: {0}")]
    Regex(#[from] regex::Error),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Git error: {0}")]
    Git(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("The indexing queue is full (repo {0})")]
    QueueFull(String),

    #[error("Deletion in progress for repo {0}")]
    DeletionInProgress(String),

    #[error("Indexing failed, check server logs: {0}")]
    IndexingFailed(String),

    #[error("ruler({height}) = {ruler} is out of range of len(hops) = {hops}")]
    Ruler { height: i64, ruler: usize, hops: usize },

    #[error("{0}")]
    Timeout(String),

    #[error("Request cancelled")]
    Cancelled,
}
