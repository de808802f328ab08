//! Database schema definitions

/// SQL to create the repos table
pub const CREATE_REPOS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS repos (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    last_accessed_at INTEGER NOT NULL
)
"#;

/// SQL to create the ancestry table
///
/// `ancestor` is a sparse pointer (not necessarily the git parent). The root commit
/// points at the NULL sentinel, id 0, which never exists as a row.
pub const CREATE_ANCESTRY_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS ancestry (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    repo_id INTEGER NOT NULL,
    commit_hash TEXT NOT NULL,
    height INTEGER NOT NULL,
    ancestor INTEGER NOT NULL,
    UNIQUE(repo_id, commit_hash)
)
"#;

/// SQL to create the symbols table
pub const CREATE_SYMBOLS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS symbols (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    repo_id INTEGER NOT NULL,
    path TEXT NOT NULL,
    name TEXT NOT NULL,
    added TEXT NOT NULL DEFAULT '[]',
    deleted TEXT NOT NULL DEFAULT '[]'
)
"#;

/// SQL to create indexes
pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_repos_last_accessed_at ON repos(last_accessed_at)",
    "CREATE INDEX IF NOT EXISTS idx_ancestry_repo ON ancestry(repo_id)",
    "CREATE INDEX IF NOT EXISTS idx_symbols_repo_path_name ON symbols(repo_id, path, name)",
];

/// All schema creation statements
pub fn all_schema_statements() -> Vec<&'static str> {
    let mut stmts = vec![
        CREATE_REPOS_TABLE,
        CREATE_ANCESTRY_TABLE,
        CREATE_SYMBOLS_TABLE,
    ];
    stmts.extend(CREATE_INDEXES.iter().copied());
    stmts
}
