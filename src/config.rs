use crate::query::SearchMode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Service configuration, read from `rockskip.toml`.
///
/// Every field has a default so a partial file (or no file at all) is valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RockskipConfig {
    /// SQLite database file
    pub database: PathBuf,
    /// Directory holding one git clone per repository name
    pub repos_root: PathBuf,
    /// Number of repositories kept before the least recently searched ones are evicted
    pub max_repos: usize,
    /// Number of index workers (each repo is pinned to one of them)
    pub index_workers: usize,
    /// Capacity of each worker's request queue
    pub index_queue_size: usize,
    /// Capacity of the (path, name) -> symbol id cache used while indexing
    pub symbols_cache_size: usize,
    /// Capacity of the path -> symbol names cache used while indexing
    pub path_symbols_cache_size: usize,
    /// Search the nearest indexed ancestor instead of waiting for indexing
    pub search_last_indexed_commit: bool,
    /// Size of the read connection pool
    pub read_pool_size: u32,
    /// universal-ctags executable
    pub ctags_command: String,
    /// HTTP listen address for `rockskip serve`
    pub listen: String,
}

impl Default for RockskipConfig {
    fn default() -> Self {
        Self {
            database: default_database_path_in(Path::new(".")),
            repos_root: PathBuf::from("repos"),
            max_repos: 1000,
            index_workers: 4,
            index_queue_size: 1000,
            symbols_cache_size: 100_000,
            path_symbols_cache_size: 10_000,
            search_last_indexed_commit: false,
            read_pool_size: 8,
            ctags_command: "universal-ctags".to_string(),
            listen: "127.0.0.1:3184".to_string(),
        }
    }
}

impl RockskipConfig {
    /// Search mode used when a request doesn't pick one.
    pub fn default_search_mode(&self) -> SearchMode {
        if self.search_last_indexed_commit {
            SearchMode::NearestIndexedAncestor
        } else {
            SearchMode::Exact
        }
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("rockskip.toml")
}

pub fn default_database_path_in(base: &Path) -> PathBuf {
    base.join(".rockskip").join("rockskip.db")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<RockskipConfig> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        tracing::debug!("no config at {}, using defaults", path.display());
        return Ok(RockskipConfig::default());
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: RockskipConfig = toml::from_str(&contents)?;
    if config.index_workers == 0 {
        anyhow::bail!("index_workers must be at least 1 in {}", path.display());
    }
    Ok(config)
}

pub fn ensure_db_dir(db_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: RockskipConfig = toml::from_str("max_repos = 3\nlisten = \"0.0.0.0:9000\"").unwrap();
        assert_eq!(config.max_repos, 3);
        assert_eq!(config.listen, "0.0.0.0:9000");
        assert_eq!(config.index_workers, 4);
        assert_eq!(config.default_search_mode(), SearchMode::Exact);
    }

    #[test]
    fn test_missing_config_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(Some(&dir.path().join("nope.toml"))).unwrap();
        assert_eq!(config.max_repos, 1000);
    }

    #[test]
    fn test_zero_workers_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rockskip.toml");
        std::fs::write(&path, "index_workers = 0").unwrap();
        assert!(load_config(Some(&path)).is_err());
    }
}
