//! Bounded caches used while indexing one repo.
//!
//! Both are pure optimizations over the database and live only for one `index` call.

use std::collections::HashSet;
use std::num::NonZeroUsize;

use lru::LruCache;

fn capacity(size: usize) -> NonZeroUsize {
    NonZeroUsize::new(size).unwrap_or(NonZeroUsize::MIN)
}

/// (path, name) -> id of the symbol row currently visible at the tip
pub struct SymbolIdCache {
    inner: LruCache<(String, String), i64>,
}

impl SymbolIdCache {
    pub fn new(size: usize) -> Self {
        Self { inner: LruCache::new(capacity(size)) }
    }

    pub fn get(&mut self, path: &str, name: &str) -> Option<i64> {
        self.inner.get(&(path.to_string(), name.to_string())).copied()
    }

    pub fn set(&mut self, path: &str, name: &str, id: i64) {
        self.inner.put((path.to_string(), name.to_string()), id);
    }
}

/// path -> names the path defined at the tip.
///
/// Renames are not tracked; a rename is a delete of one path plus an add of another.
pub struct PathSymbolsCache {
    inner: LruCache<String, HashSet<String>>,
}

impl PathSymbolsCache {
    pub fn new(size: usize) -> Self {
        Self { inner: LruCache::new(capacity(size)) }
    }

    pub fn get(&mut self, path: &str) -> Option<HashSet<String>> {
        self.inner.get(path).cloned()
    }

    pub fn set(&mut self, path: &str, names: HashSet<String>) {
        self.inner.put(path.to_string(), names);
    }

    pub fn remove(&mut self, path: &str) {
        self.inner.pop(path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_id_cache_evicts_least_recent() {
        let mut cache = SymbolIdCache::new(2);
        cache.set("a", "x", 1);
        cache.set("a", "y", 2);
        assert_eq!(cache.get("a", "x"), Some(1));
        cache.set("b", "z", 3);
        assert_eq!(cache.get("a", "y"), None);
        assert_eq!(cache.get("a", "x"), Some(1));
    }

    #[test]
    fn test_zero_sized_cache_still_holds_one_entry() {
        let mut cache = PathSymbolsCache::new(0);
        cache.set("a.go", HashSet::from(["foo".to_string()]));
        assert!(cache.get("a.go").unwrap().contains("foo"));
        cache.remove("a.go");
        assert!(cache.get("a.go").is_none());
    }
}
