//! Storage Layer - SQLite-backed persistence
//!
//! System of record is SQLite with tables:
//! - repos(id, name, last_accessed_at)
//! - ancestry(id, repo_id, commit_hash, height, ancestor)
//! - symbols(id, repo_id, path, name, added, deleted)
//!
//! `added` and `deleted` are JSON integer arrays of hop (commit) ids.

pub mod schema;
pub mod sqlite;

pub use sqlite::{CommitNode, DbStats, HopStatus, RepoRow, SqliteStore, NULL_COMMIT};
