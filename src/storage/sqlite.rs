//! SQLite storage implementation

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use regex::Regex;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use serde::Serialize;

use super::schema;
use crate::Result;

/// Id of the sentinel commit every root commit points at. It never exists as a row.
pub const NULL_COMMIT: i64 = 0;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Which hop array of a symbol row an operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HopStatus {
    Added,
    Deleted,
}

impl HopStatus {
    fn column(self) -> &'static str {
        match self {
            HopStatus::Added => "added",
            HopStatus::Deleted => "deleted",
        }
    }
}

/// A row of the ancestry table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitNode {
    pub id: i64,
    pub commit_hash: String,
    pub height: i64,
    pub ancestor: i64,
}

/// A row of the repos table
#[derive(Debug, Clone, Serialize)]
pub struct RepoRow {
    pub id: i64,
    pub name: String,
    pub last_accessed_at: i64,
}

#[derive(Debug)]
struct ConnectionCustomizer;

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for ConnectionCustomizer {
    fn on_acquire(&self, conn: &mut Connection) -> std::result::Result<(), rusqlite::Error> {
        configure_connection(conn)
    }
}

fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.busy_timeout(Duration::from_secs(30))?;
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        ",
    )?;
    register_regexp(conn)
}

/// Registers `regexp(pattern, text)`, compiling each distinct pattern once per statement.
fn register_regexp(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "regexp",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        move |ctx| {
            let regex: Arc<Regex> = ctx.get_or_create_aux(0, |vr| -> std::result::Result<_, BoxError> {
                Ok(Regex::new(vr.as_str()?)?)
            })?;
            let text = ctx
                .get_raw(1)
                .as_str()
                .map_err(|e| rusqlite::Error::UserFunctionError(e.into()))?;
            Ok(regex.is_match(text))
        },
    )
}

/// SQLite-backed storage for repos, ancestry and symbols.
///
/// Writes are serialized through a single connection; reads come from a pool of
/// WAL connections, so readers see the last committed state while indexing runs.
pub struct SqliteStore {
    db_path: PathBuf,
    write_conn: Mutex<Connection>,
    read_pool: Pool<SqliteConnectionManager>,
}

impl SqliteStore {
    /// Open a database file (creates if doesn't exist)
    pub fn open(path: &Path, read_pool_size: u32) -> Result<Self> {
        let write_conn = Connection::open(path)?;
        configure_connection(&write_conn)?;
        for stmt in schema::all_schema_statements() {
            write_conn.execute(stmt, [])?;
        }

        let manager = SqliteConnectionManager::file(path);
        let read_pool = Pool::builder()
            .max_size(read_pool_size.max(1))
            .connection_timeout(Duration::from_secs(30))
            .connection_customizer(Box::new(ConnectionCustomizer))
            .build(manager)?;

        tracing::debug!(path = %path.display(), "opened symbol store");

        Ok(Self {
            db_path: path.to_path_buf(),
            write_conn: Mutex::new(write_conn),
            read_pool,
        })
    }

    /// Get the database file path
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// The single write connection. Never hold the guard across an `.await`.
    pub fn write(&self) -> MutexGuard<'_, Connection> {
        self.write_conn.lock()
    }

    /// A pooled read connection
    pub fn read(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
        Ok(self.read_pool.get()?)
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats> {
        let conn = self.read()?;
        let count = |table: &str| -> Result<usize> {
            let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
            Ok(n as usize)
        };
        Ok(DbStats {
            repos: count("repos")?,
            commits: count("ancestry")?,
            symbols: count("symbols")?,
        })
    }
}

/// Database statistics
#[derive(Debug, Clone, Serialize)]
pub struct DbStats {
    pub repos: usize,
    pub commits: usize,
    pub symbols: usize,
}

impl std::fmt::Display for DbStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Database Statistics:")?;
        writeln!(f, "  Repos: {}", self.repos)?;
        writeln!(f, "  Commits: {}", self.commits)?;
        writeln!(f, "  Symbols: {}", self.symbols)
    }
}

pub(crate) fn to_json_array(ids: &[i64]) -> Result<String> {
    Ok(serde_json::to_string(ids)?)
}

fn parse_json_array(text: &str) -> Result<Vec<i64>> {
    Ok(serde_json::from_str(text)?)
}

/// `true` when a row's `added` hits `hops_param` and its `deleted` doesn't.
pub(crate) fn visible_clause(table: &str, hops_param: &str) -> String {
    format!(
        "EXISTS (SELECT 1 FROM json_each({table}.added) WHERE value IN (SELECT value FROM json_each({hops_param}))) \
         AND NOT EXISTS (SELECT 1 FROM json_each({table}.deleted) WHERE value IN (SELECT value FROM json_each({hops_param})))"
    )
}

fn now_micros() -> i64 {
    chrono::Utc::now().timestamp_micros()
}

// ========== Repo Operations ==========

/// Look up a repo id by name
pub fn get_repo_id(conn: &Connection, name: &str) -> Result<Option<i64>> {
    conn.query_row("SELECT id FROM repos WHERE name = ?1", [name], |row| row.get(0))
        .optional()
        .map_err(Into::into)
}

/// Insert the repo if missing, leaving an existing recency untouched
pub fn ensure_repo(conn: &Connection, name: &str) -> Result<i64> {
    conn.execute(
        "INSERT INTO repos (name, last_accessed_at)
         VALUES (?1, MAX(?2, (SELECT COALESCE(MAX(last_accessed_at), 0) + 1 FROM repos)))
         ON CONFLICT(name) DO NOTHING",
        params![name, now_micros()],
    )?;
    conn.query_row("SELECT id FROM repos WHERE name = ?1", [name], |row| row.get(0))
        .map_err(Into::into)
}

/// Insert the repo or set its `last_accessed_at` to now.
///
/// Stamps are strictly increasing across calls, so two repos never share a recency rank.
pub fn update_last_accessed_at(conn: &Connection, name: &str) -> Result<i64> {
    conn.query_row(
        "INSERT INTO repos (name, last_accessed_at)
         VALUES (?1, MAX(?2, (SELECT COALESCE(MAX(last_accessed_at), 0) + 1 FROM repos)))
         ON CONFLICT(name) DO UPDATE SET last_accessed_at = excluded.last_accessed_at
         RETURNING id",
        params![name, now_micros()],
        |row| row.get(0),
    )
    .map_err(Into::into)
}

/// The least recently accessed repo whose recency rank is beyond `max_repos`
pub fn select_eviction_candidate(conn: &Connection, max_repos: usize) -> Result<Option<(i64, String)>> {
    conn.query_row(
        "SELECT id, name
         FROM (
             SELECT id, name, last_accessed_at, RANK() OVER (ORDER BY last_accessed_at DESC) AS repo_rank
             FROM repos
         )
         WHERE repo_rank > ?1
         ORDER BY last_accessed_at ASC
         LIMIT 1",
        [i64::try_from(max_repos).unwrap_or(i64::MAX)],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
    .optional()
    .map_err(Into::into)
}

/// Current recency rank of a repo (1 = most recent), `None` if it no longer exists
pub fn repo_rank(conn: &Connection, repo_id: i64) -> Result<Option<usize>> {
    let rank: Option<i64> = conn
        .query_row(
            "SELECT repo_rank
             FROM (SELECT id, RANK() OVER (ORDER BY last_accessed_at DESC) AS repo_rank FROM repos)
             WHERE id = ?1",
            [repo_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(rank.map(|r| r as usize))
}

/// Delete all rows of a repo. Callers wrap this in a transaction.
pub fn delete_repo(conn: &Connection, repo_id: i64) -> Result<()> {
    conn.execute("DELETE FROM ancestry WHERE repo_id = ?1", [repo_id])?;
    conn.execute("DELETE FROM symbols WHERE repo_id = ?1", [repo_id])?;
    conn.execute("DELETE FROM repos WHERE id = ?1", [repo_id])?;
    Ok(())
}

/// All repos, most recently accessed first
pub fn list_repos(conn: &Connection) -> Result<Vec<RepoRow>> {
    let mut stmt = conn.prepare("SELECT id, name, last_accessed_at FROM repos ORDER BY last_accessed_at DESC")?;
    let rows = stmt.query_map([], |row| {
        Ok(RepoRow {
            id: row.get(0)?,
            name: row.get(1)?,
            last_accessed_at: row.get(2)?,
        })
    })?;
    let mut repos = Vec::new();
    for row in rows {
        repos.push(row?);
    }
    Ok(repos)
}

// ========== Ancestry Operations ==========

fn row_to_commit(row: &rusqlite::Row) -> rusqlite::Result<CommitNode> {
    Ok(CommitNode {
        id: row.get(0)?,
        commit_hash: row.get(1)?,
        height: row.get(2)?,
        ancestor: row.get(3)?,
    })
}

/// Find an indexed commit by hash
pub fn get_commit_by_hash(conn: &Connection, repo_id: i64, commit_hash: &str) -> Result<Option<CommitNode>> {
    conn.query_row(
        "SELECT id, commit_hash, height, ancestor FROM ancestry WHERE repo_id = ?1 AND commit_hash = ?2",
        params![repo_id, commit_hash],
        row_to_commit,
    )
    .optional()
    .map_err(Into::into)
}

/// Find an indexed commit by id
pub fn get_commit_by_id(conn: &Connection, id: i64) -> Result<Option<CommitNode>> {
    let mut stmt = conn.prepare_cached("SELECT id, commit_hash, height, ancestor FROM ancestry WHERE id = ?1")?;
    stmt.query_row([id], row_to_commit).optional().map_err(Into::into)
}

/// Insert a commit node and return its id
pub fn insert_commit(conn: &Connection, repo_id: i64, commit_hash: &str, height: i64, ancestor: i64) -> Result<i64> {
    conn.execute(
        "INSERT INTO ancestry (repo_id, commit_hash, height, ancestor) VALUES (?1, ?2, ?3, ?4)",
        params![repo_id, commit_hash, height, ancestor],
    )?;
    Ok(conn.last_insert_rowid())
}

// ========== Symbol Operations ==========

/// Append `commit` to the given hop array of every row whose last element is in `hops`.
pub fn append_hop(conn: &Connection, repo_id: i64, hops: &[i64], status: HopStatus, commit: i64) -> Result<usize> {
    if hops.is_empty() {
        return Ok(0);
    }
    let column = status.column();
    let sql = format!(
        "UPDATE symbols SET {column} = json_insert({column}, '$[#]', ?1)
         WHERE repo_id = ?2 AND json_extract({column}, '$[#-1]') IN (SELECT value FROM json_each(?3))"
    );
    let updated = conn.execute(&sql, params![commit, repo_id, to_json_array(hops)?])?;
    Ok(updated)
}

/// Names visible at `hops` for each of the given paths. Paths without symbols map to an empty set.
pub fn get_symbols_in_files(
    conn: &Connection,
    repo_id: i64,
    paths: &[String],
    hops: &[i64],
) -> Result<HashMap<String, HashSet<String>>> {
    let mut result: HashMap<String, HashSet<String>> =
        paths.iter().map(|p| (p.clone(), HashSet::new())).collect();
    if paths.is_empty() {
        return Ok(result);
    }

    let sql = format!(
        "SELECT path, name FROM symbols
         WHERE repo_id = ?1 AND path IN (SELECT value FROM json_each(?2)) AND {}",
        visible_clause("symbols", "?3")
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![repo_id, serde_json::to_string(paths)?, to_json_array(hops)?],
        |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
    )?;
    for row in rows {
        let (path, name) = row?;
        result.entry(path).or_default().insert(name);
    }
    Ok(result)
}

/// Id of the row for (path, name) visible at `hops`
pub fn get_symbol(conn: &Connection, repo_id: i64, path: &str, name: &str, hops: &[i64]) -> Result<Option<i64>> {
    let sql = format!(
        "SELECT id FROM symbols WHERE repo_id = ?1 AND path = ?2 AND name = ?3 AND {} LIMIT 1",
        visible_clause("symbols", "?4")
    );
    conn.query_row(&sql, params![repo_id, path, name, to_json_array(hops)?], |row| row.get(0))
        .optional()
        .map_err(Into::into)
}

/// Append `commit` to one hop array of a single row
pub fn update_symbol_hops(conn: &Connection, id: i64, status: HopStatus, commit: i64) -> Result<()> {
    let column = status.column();
    let sql = format!("UPDATE symbols SET {column} = json_insert({column}, '$[#]', ?1) WHERE id = ?2");
    conn.execute(&sql, params![commit, id])?;
    Ok(())
}

/// Insert a symbol first seen at `commit`
pub fn insert_symbol(conn: &Connection, repo_id: i64, path: &str, name: &str, commit: i64) -> Result<i64> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO symbols (repo_id, path, name, added, deleted) VALUES (?1, ?2, ?3, ?4, '[]')",
    )?;
    stmt.execute(params![repo_id, path, name, to_json_array(&[commit])?])?;
    Ok(conn.last_insert_rowid())
}

/// Remove `commit` from rows that list it as both added and deleted.
///
/// Such a row was appended to by bookkeeping and then deleted in the same commit. Rows left
/// with an empty `added` can never become visible again and are dropped.
pub fn delete_redundant(conn: &Connection, repo_id: i64, commit: i64) -> Result<usize> {
    let mut stmt = conn.prepare(
        "SELECT id, added, deleted FROM symbols
         WHERE repo_id = ?1
           AND EXISTS (SELECT 1 FROM json_each(symbols.added) WHERE value = ?2)
           AND EXISTS (SELECT 1 FROM json_each(symbols.deleted) WHERE value = ?2)",
    )?;
    let rows = stmt.query_map(params![repo_id, commit], |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
    })?;
    let mut redundant = Vec::new();
    for row in rows {
        redundant.push(row?);
    }

    for (id, added, deleted) in &redundant {
        let added: Vec<i64> = parse_json_array(added)?.into_iter().filter(|hop| *hop != commit).collect();
        let deleted: Vec<i64> = parse_json_array(deleted)?.into_iter().filter(|hop| *hop != commit).collect();
        if added.is_empty() {
            conn.execute("DELETE FROM symbols WHERE id = ?1", [id])?;
        } else {
            conn.execute(
                "UPDATE symbols SET added = ?1, deleted = ?2 WHERE id = ?3",
                params![to_json_array(&added)?, to_json_array(&deleted)?, id],
            )?;
        }
    }
    Ok(redundant.len())
}

/// Distinct paths with a symbol visible at `hops` that satisfies `filter`, in path order.
///
/// `filter` is a boolean SQL expression over the symbols table using `?` placeholders,
/// bound in order from `filter_params`.
pub fn find_candidate_paths(
    conn: &Connection,
    repo_id: i64,
    hops: &[i64],
    filter: Option<(&str, &[Value])>,
    limit: usize,
) -> Result<Vec<String>> {
    let hops = to_json_array(hops)?;
    let mut sql = format!(
        "SELECT DISTINCT path FROM symbols WHERE repo_id = ? AND {}",
        visible_clause("symbols", "?")
    );
    let mut values = vec![Value::Integer(repo_id), Value::Text(hops.clone()), Value::Text(hops)];
    if let Some((filter_sql, filter_params)) = filter {
        sql.push_str(&format!(" AND ({filter_sql})"));
        values.extend(filter_params.iter().cloned());
    }
    sql.push_str(" ORDER BY path LIMIT ?");
    values.push(Value::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(values.iter()), |row| row.get::<_, String>(0))?;
    let mut paths = Vec::new();
    for row in rows {
        paths.push(row?);
    }
    Ok(paths)
}

/// The `added` and `deleted` arrays of a row
pub fn symbol_hops(conn: &Connection, id: i64) -> Result<Option<(Vec<i64>, Vec<i64>)>> {
    let row: Option<(String, String)> = conn
        .query_row("SELECT added, deleted FROM symbols WHERE id = ?1", [id], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })
        .optional()?;
    match row {
        Some((added, deleted)) => Ok(Some((parse_json_array(&added)?, parse_json_array(&deleted)?))),
        None => Ok(None),
    }
}

/// Count rows of one table belonging to a repo
pub fn count_rows_for_repo(conn: &Connection, table: &str, repo_id: i64) -> Result<usize> {
    let column = if table == "repos" { "id" } else { "repo_id" };
    let n: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {table} WHERE {column} = ?1"),
        [repo_id],
        |row| row.get(0),
    )?;
    Ok(n as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_store() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("rockskip.db"), 2).unwrap();
        (dir, store)
    }

    #[test]
    fn test_last_accessed_at_strictly_increases() {
        let (_dir, store) = open_store();
        let conn = store.write();

        let a = update_last_accessed_at(&conn, "a").unwrap();
        let b = update_last_accessed_at(&conn, "b").unwrap();
        let a_again = update_last_accessed_at(&conn, "a").unwrap();
        assert_eq!(a, a_again);
        assert_ne!(a, b);

        let repos = list_repos(&conn).unwrap();
        assert_eq!(repos[0].name, "a");
        assert!(repos[0].last_accessed_at > repos[1].last_accessed_at);
        assert_eq!(repo_rank(&conn, a).unwrap(), Some(1));
        assert_eq!(repo_rank(&conn, b).unwrap(), Some(2));
    }

    #[test]
    fn test_eviction_candidate_is_oldest_beyond_cutoff() {
        let (_dir, store) = open_store();
        let conn = store.write();

        update_last_accessed_at(&conn, "old").unwrap();
        update_last_accessed_at(&conn, "mid").unwrap();
        update_last_accessed_at(&conn, "new").unwrap();

        let (_, name) = select_eviction_candidate(&conn, 1).unwrap().unwrap();
        assert_eq!(name, "old");
        assert!(select_eviction_candidate(&conn, 3).unwrap().is_none());
        // an unbounded cutoff evicts nothing
        assert!(select_eviction_candidate(&conn, usize::MAX).unwrap().is_none());
    }

    #[test]
    fn test_append_hop_only_touches_matching_tails() {
        let (_dir, store) = open_store();
        let conn = store.write();
        let repo = ensure_repo(&conn, "r").unwrap();

        let anchored = insert_symbol(&conn, repo, "a.go", "foo", 5).unwrap();
        let elsewhere = insert_symbol(&conn, repo, "a.go", "bar", 9).unwrap();

        let updated = append_hop(&conn, repo, &[5, 7], HopStatus::Added, 11).unwrap();
        assert_eq!(updated, 1);
        assert_eq!(symbol_hops(&conn, anchored).unwrap().unwrap().0, vec![5, 11]);
        assert_eq!(symbol_hops(&conn, elsewhere).unwrap().unwrap().0, vec![9]);

        // empty `deleted` arrays have no tail to match
        assert_eq!(append_hop(&conn, repo, &[5, 7], HopStatus::Deleted, 11).unwrap(), 0);
    }

    #[test]
    fn test_visibility_queries() {
        let (_dir, store) = open_store();
        let conn = store.write();
        let repo = ensure_repo(&conn, "r").unwrap();

        let foo = insert_symbol(&conn, repo, "a.go", "foo", 1).unwrap();
        insert_symbol(&conn, repo, "a.go", "bar", 1).unwrap();
        update_symbol_hops(&conn, foo, HopStatus::Deleted, 2).unwrap();

        let before = get_symbols_in_files(&conn, repo, &["a.go".to_string()], &[1, 0]).unwrap();
        assert_eq!(before["a.go"].len(), 2);

        let after = get_symbols_in_files(&conn, repo, &["a.go".to_string(), "b.go".to_string()], &[2, 1, 0]).unwrap();
        assert_eq!(after["a.go"], HashSet::from(["bar".to_string()]));
        assert!(after["b.go"].is_empty());

        assert_eq!(get_symbol(&conn, repo, "a.go", "foo", &[1]).unwrap(), Some(foo));
        assert_eq!(get_symbol(&conn, repo, "a.go", "foo", &[2, 1]).unwrap(), None);
    }

    #[test]
    fn test_delete_redundant_removes_shared_hop() {
        let (_dir, store) = open_store();
        let conn = store.write();
        let repo = ensure_repo(&conn, "r").unwrap();

        let kept = insert_symbol(&conn, repo, "a.go", "foo", 1).unwrap();
        update_symbol_hops(&conn, kept, HopStatus::Added, 3).unwrap();
        update_symbol_hops(&conn, kept, HopStatus::Deleted, 3).unwrap();

        let dead = insert_symbol(&conn, repo, "a.go", "bar", 3).unwrap();
        update_symbol_hops(&conn, dead, HopStatus::Deleted, 3).unwrap();

        assert_eq!(delete_redundant(&conn, repo, 3).unwrap(), 2);
        assert_eq!(symbol_hops(&conn, kept).unwrap(), Some((vec![1], vec![])));
        assert_eq!(symbol_hops(&conn, dead).unwrap(), None);
    }

    #[test]
    fn test_delete_repo_removes_every_table() {
        let (_dir, store) = open_store();
        let mut conn = store.write();
        let repo = ensure_repo(&conn, "r").unwrap();
        let commit = insert_commit(&conn, repo, "abc", 1, NULL_COMMIT).unwrap();
        insert_symbol(&conn, repo, "a.go", "foo", commit).unwrap();

        let tx = conn.transaction().unwrap();
        delete_repo(&tx, repo).unwrap();
        tx.commit().unwrap();

        for table in ["repos", "ancestry", "symbols"] {
            assert_eq!(count_rows_for_repo(&conn, table, repo).unwrap(), 0);
        }
        assert!(get_commit_by_hash(&conn, repo, "abc").unwrap().is_none());
    }

    #[test]
    fn test_candidate_paths_filter_and_limit() {
        let (_dir, store) = open_store();
        let conn = store.write();
        let repo = ensure_repo(&conn, "r").unwrap();

        insert_symbol(&conn, repo, "b.go", "foo", 1).unwrap();
        insert_symbol(&conn, repo, "a.go", "foo", 1).unwrap();
        insert_symbol(&conn, repo, "a.go", "bar", 1).unwrap();
        let gone = insert_symbol(&conn, repo, "c.go", "foo", 1).unwrap();
        update_symbol_hops(&conn, gone, HopStatus::Deleted, 2).unwrap();

        let all = find_candidate_paths(&conn, repo, &[2, 1], None, 10).unwrap();
        assert_eq!(all, vec!["a.go".to_string(), "b.go".to_string()]);

        let params = [Value::Text("foo".into())];
        let foo = find_candidate_paths(&conn, repo, &[1], Some(("name = ?", &params)), 10).unwrap();
        assert_eq!(foo, vec!["a.go".to_string(), "b.go".to_string(), "c.go".to_string()]);

        let limited = find_candidate_paths(&conn, repo, &[1], Some(("name = ?", &params)), 1).unwrap();
        assert_eq!(limited, vec!["a.go".to_string()]);
    }

    #[test]
    fn test_regexp_function_registered_on_pooled_connections() {
        let (_dir, store) = open_store();
        let conn = store.read().unwrap();
        let matched: bool = conn
            .query_row("SELECT regexp('^foo[0-9]+$', 'foo42')", [], |row| row.get(0))
            .unwrap();
        assert!(matched);
    }
}
