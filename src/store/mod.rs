//! Local persistence for catalog records.
//!
//! - [`RedbStore`]: redb file, JSON-encoded records keyed by id (default)
//! - [`MemoryStore`]: in-process map, for tests and as a degraded fallback
//!
//! The orchestrator holds an `Arc<dyn CatalogStore>` and every read or write
//! of local data goes through it.

pub mod disk;
pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::catalog::{CatalogFilter, CatalogRecord};

pub use disk::RedbStore;
pub use memory::MemoryStore;

/// Persistent table of [`CatalogRecord`]s keyed by id.
///
/// Writes are upsert-replace: a record with an existing id fully replaces
/// the stored one. Queries are full scans with in-memory predicates.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Human-readable backend name (e.g., "redb", "memory").
    fn backend_name(&self) -> &str;

    /// Insert or replace every record. Each record is written atomically.
    async fn upsert_all(&self, records: &[CatalogRecord]) -> Result<()>;

    /// Every stored record, ordered by id.
    async fn get_all(&self) -> Result<Vec<CatalogRecord>>;

    async fn find_by_id(&self, id: &str) -> Result<Option<CatalogRecord>>;

    /// Records whose name matches a LIKE-style `pattern`.
    ///
    /// `%` matches any run of characters and `_` exactly one; matching is
    /// case-insensitive. A pattern without wildcards matches by containment.
    async fn find_by_name_like(&self, pattern: &str) -> Result<Vec<CatalogRecord>> {
        let all = self.get_all().await?;
        Ok(all
            .into_iter()
            .filter(|r| like_match(pattern, &r.name))
            .collect())
    }

    /// Records carrying the filter's genre and platform (case-insensitive).
    async fn filter(&self, filter: &CatalogFilter) -> Result<Vec<CatalogRecord>> {
        let all = self.get_all().await?;
        Ok(all.into_iter().filter(|r| matches_filter(r, filter)).collect())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.get_all().await?.len())
    }

    /// Remove every record. Administrative only.
    async fn purge(&self) -> Result<()>;
}

pub fn matches_filter(record: &CatalogRecord, filter: &CatalogFilter) -> bool {
    let wanted = |v: &Option<String>| {
        v.as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    let genre_ok = wanted(&filter.genre).map_or(true, |g| record.has_genre(&g));
    let platform_ok = wanted(&filter.platform).map_or(true, |p| record.has_platform(&p));
    genre_ok && platform_ok
}

/// SQL-LIKE matching over characters, case-insensitive.
pub fn like_match(pattern: &str, text: &str) -> bool {
    let pattern = pattern.trim().to_lowercase();
    let text = text.to_lowercase();
    if !pattern.contains(['%', '_']) {
        return text.contains(&pattern);
    }

    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    // Last `%` seen in the pattern and the text position it was tried at.
    let mut backtrack: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '_' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '%' {
            backtrack = Some((pi, ti));
            pi += 1;
        } else if let Some((star, matched)) = backtrack {
            pi = star + 1;
            ti = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|&c| c == '%')
}
