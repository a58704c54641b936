//! TTL result cache in front of any retriever

use crate::error::Result;
use crate::retrieval::{QueryContext, Retriever, SearchResult, SharedRetriever};
use ahash::AHashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, warn, Span};

/// Default number of cached queries
pub const DEFAULT_CACHE_CAPACITY: usize = 128;

/// Default entry lifetime
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Cache statistics snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheInfo {
    pub hits: u64,
    pub misses: u64,
    pub capacity: usize,
    pub size: usize,
    pub hit_rate: f64,
}

struct Entry {
    results: Vec<SearchResult>,
    stored_at: Instant,
    sequence: u64,
}

#[derive(Default)]
struct CacheState {
    entries: AHashMap<String, Entry>,
    next_sequence: u64,
    hits: u64,
    misses: u64,
}

impl CacheState {
    /// Drop the entry inserted first
    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.sequence)
            .map(|(key, _)| key.clone());

        if let Some(key) = oldest {
            debug!("Evicting cache entry {}", key);
            self.entries.remove(&key);
        }
    }
}

/// Caching wrapper for retrievers
///
/// Entries expire `ttl` after they were stored. When full, the entry
/// inserted earliest is evicted; reads do not refresh an entry's age.
/// The wrapped retriever is called without holding the cache lock, so
/// two concurrent misses on one key may both reach it.
pub struct CachedRetriever {
    inner: SharedRetriever,
    capacity: usize,
    ttl: Duration,
    state: Mutex<CacheState>,
    span: Span,
}

impl CachedRetriever {
    pub fn new(inner: SharedRetriever, capacity: usize, ttl: Duration) -> Self {
        Self {
            inner,
            capacity,
            ttl,
            state: Mutex::new(CacheState::default()),
            span: tracing::info_span!("cached_retriever"),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Fixed-length key over everything that shapes a result list
    pub fn cache_key(context: &QueryContext) -> String {
        let types = match context.search_types() {
            Some(types) => types
                .iter()
                .map(|t| t.as_str())
                .collect::<Vec<_>>()
                .join(","),
            None => "all".to_string(),
        };
        let fusion = context
            .fusion_method()
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| "default".to_string());
        // Filters are a BTreeMap, so the JSON text is key-sorted
        let filters = context
            .filters()
            .and_then(|f| serde_json::to_string(f).ok())
            .unwrap_or_else(|| "none".to_string());

        let raw = format!(
            "{}|{}|{}|{}|{}",
            context.query(),
            context.top_k(),
            types,
            fusion,
            filters
        );
        blake3::hash(raw.as_bytes()).to_hex().to_string()
    }

    fn lookup(&self, key: &str) -> Option<Vec<SearchResult>> {
        let mut state = self.state.lock();

        let fresh = match state.entries.get(key) {
            Some(entry) => entry.stored_at.elapsed() <= self.ttl,
            None => false,
        };
        if fresh {
            state.hits += 1;
            state.entries.get(key).map(|entry| entry.results.clone())
        } else {
            // Expired entries go lazily, on the lookup that finds them
            state.entries.remove(key);
            state.misses += 1;
            None
        }
    }

    fn store(&self, key: String, results: Vec<SearchResult>) {
        if self.capacity == 0 {
            return;
        }

        let mut state = self.state.lock();
        if !state.entries.contains_key(&key) && state.entries.len() >= self.capacity {
            state.evict_oldest();
        }

        let sequence = state.next_sequence;
        state.next_sequence += 1;
        state.entries.insert(
            key,
            Entry {
                results,
                stored_at: Instant::now(),
                sequence,
            },
        );
    }

    /// Drop every entry and reset the counters
    pub fn clear(&self) {
        let mut state = self.state.lock();
        *state = CacheState::default();
        debug!("Cache cleared");
    }

    pub fn cache_info(&self) -> CacheInfo {
        let state = self.state.lock();
        let lookups = state.hits + state.misses;

        CacheInfo {
            hits: state.hits,
            misses: state.misses,
            capacity: self.capacity,
            size: state.entries.len(),
            hit_rate: if lookups > 0 {
                state.hits as f64 / lookups as f64
            } else {
                0.0
            },
        }
    }
}

impl Retriever for CachedRetriever {
    /// Serve from cache when fresh
    ///
    /// An error from the wrapped retriever is logged and answered with an
    /// empty, uncached list.
    fn search(&self, context: &QueryContext) -> Result<Vec<SearchResult>> {
        let _entered = self.span.enter();
        let key = Self::cache_key(context);

        if let Some(results) = self.lookup(&key) {
            debug!("Cache hit for query: {}", context.query());
            return Ok(results);
        }

        debug!("Cache miss for query: {}", context.query());
        match self.inner.search(context) {
            Ok(results) => {
                self.store(key, results.clone());
                Ok(results)
            }
            Err(e) => {
                warn!("Cached search failed for {}: {}", self.inner.name(), e);
                Ok(Vec::new())
            }
        }
    }

    fn name(&self) -> String {
        format!("cached_{}", self.inner.name())
    }
}
