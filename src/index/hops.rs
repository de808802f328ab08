//! Ancestor spine ("hops") resolution
//!
//! Every indexed commit stores one sparse ancestor pointer. A new commit at height `h` points
//! at `hops[ruler(h)]` of its parent's spine, which keeps every spine O(log height) long.

use rusqlite::Connection;

use crate::Result;
use crate::storage::NULL_COMMIT;
use crate::storage::sqlite::get_commit_by_id;

/// 2-adic valuation of `n`: 0 for odd `n`, otherwise `1 + ruler(n / 2)`.
///
/// `ruler(0)` is defined as 0; heights start at 1 so it never matters.
pub fn ruler(n: i64) -> usize {
    if n == 0 { 0 } else { n.trailing_zeros() as usize }
}

/// Spine of `commit`: the commit itself, then each ancestor pointer, ending with the sentinel.
///
/// `get_hops(conn, NULL_COMMIT)` is `[NULL_COMMIT]`.
pub fn get_hops(conn: &Connection, commit: i64) -> Result<Vec<i64>> {
    let mut current = commit;
    let mut spine = vec![current];
    while current != NULL_COMMIT {
        match get_commit_by_id(conn, current)? {
            Some(node) => {
                current = node.ancestor;
                spine.push(current);
            }
            None => break,
        }
    }
    Ok(spine)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStore;
    use crate::storage::sqlite::{ensure_repo, insert_commit};

    fn recursive_ruler(n: i64) -> usize {
        if n % 2 != 0 { 0 } else { 1 + recursive_ruler(n / 2) }
    }

    #[test]
    fn test_ruler_matches_recursive_definition() {
        for n in 1..2048 {
            assert_eq!(ruler(n), recursive_ruler(n), "n = {n}");
        }
        assert_eq!(ruler(0), 0);
        assert_eq!(ruler(96), 5);
    }

    #[test]
    fn test_spines_are_logarithmic_subsequences_of_the_chain() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("db"), 1).unwrap();
        let conn = store.write();
        let repo = ensure_repo(&conn, "r").unwrap();

        let mut tip = NULL_COMMIT;
        let mut parent_of = std::collections::HashMap::new();
        for height in 1..=300i64 {
            let hops = get_hops(&conn, tip).unwrap();
            let r = ruler(height);
            assert!(r < hops.len(), "height {height}");
            let id = insert_commit(&conn, repo, &format!("c{height}"), height, hops[r]).unwrap();
            parent_of.insert(id, tip);
            tip = id;

            let spine = get_hops(&conn, tip).unwrap();
            // popcount(height) commits plus the sentinel
            assert_eq!(spine.len(), height.count_ones() as usize + 1);
            assert!(spine.len() <= 2 * (64 - height.leading_zeros() as usize) + 2);
            assert_eq!(*spine.last().unwrap(), NULL_COMMIT);

            // every hop is an ancestor on the full parent chain, in order
            let mut chain = vec![tip];
            let mut cursor = tip;
            while cursor != NULL_COMMIT {
                cursor = parent_of[&cursor];
                chain.push(cursor);
            }
            let mut chain_iter = chain.iter();
            for hop in &spine {
                assert!(chain_iter.any(|c| c == hop), "hop {hop} out of order at height {height}");
            }
        }
    }

    #[test]
    fn test_hops_of_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("db"), 1).unwrap();
        let conn = store.write();
        assert_eq!(get_hops(&conn, NULL_COMMIT).unwrap(), vec![NULL_COMMIT]);
    }
}
