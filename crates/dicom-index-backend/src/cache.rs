//! Parsed statement caching.
//!
//! Every statement run by a [`DatabaseManager`](crate::DatabaseManager) is
//! written with `${name}` placeholders and must be parsed before it can be
//! rendered for the connection's dialect. The index issues the same few
//! dozen statements over and over, so parsed statements are kept in a
//! per-connection LRU cache keyed by their SQL text.

use std::num::NonZeroUsize;

use dicom_index_sql::{LookupResult, Query};
use lru::LruCache;

/// LRU cache of parsed statements.
///
/// A capacity of zero disables caching: every lookup parses the text.
///
/// # Example
///
/// ```ignore
/// let mut cache = StatementCache::new(16);
///
/// let query = cache.get_or_parse("SELECT publicId FROM Resources WHERE internalId=${id}")?;
/// assert_eq!(cache.stats().misses, 1);
///
/// let again = cache.get_or_parse("SELECT publicId FROM Resources WHERE internalId=${id}")?;
/// assert_eq!(cache.stats().hits, 1);
/// ```
pub struct StatementCache {
    inner: Option<LruCache<String, Query>>,
    hits: u64,
    misses: u64,
}

impl StatementCache {
    /// Creates a cache holding at most `capacity` statements.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: NonZeroUsize::new(capacity).map(LruCache::new),
            hits: 0,
            misses: 0,
        }
    }

    /// Returns the parsed form of `sql`, parsing and caching it on a miss.
    ///
    /// Parse failures are not cached.
    pub fn get_or_parse(&mut self, sql: &str) -> LookupResult<Query> {
        let Some(cache) = self.inner.as_mut() else {
            self.misses += 1;
            return Query::parse(sql);
        };

        if let Some(query) = cache.get(sql) {
            self.hits += 1;
            return Ok(query.clone());
        }

        self.misses += 1;
        let query = Query::parse(sql)?;
        cache.put(sql.to_string(), query.clone());
        Ok(query)
    }

    /// Checks if `sql` is cached (without affecting LRU order).
    pub fn contains(&self, sql: &str) -> bool {
        self.inner.as_ref().is_some_and(|cache| cache.contains(sql))
    }

    /// Number of cached statements.
    pub fn len(&self) -> usize {
        self.inner.as_ref().map_or(0, LruCache::len)
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every cached statement.
    pub fn clear(&mut self) {
        if let Some(cache) = self.inner.as_mut() {
            cache.clear();
        }
    }

    /// Returns cache statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hits,
            misses: self.misses,
        }
    }
}

impl std::fmt::Debug for StatementCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatementCache")
            .field("entries", &self.len())
            .field("hits", &self.hits)
            .field("misses", &self.misses)
            .finish()
    }
}

/// Statistics about the statement cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cached statements.
    pub entries: usize,
    /// Lookups served from the cache.
    pub hits: u64,
    /// Lookups that had to parse.
    pub misses: u64,
}
