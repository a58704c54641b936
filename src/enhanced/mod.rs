//! Feature-flagged retriever stacks built around the hybrid retriever

mod adaptive;
mod factory;

pub use adaptive::{AdaptiveRetriever, SearchStrategy, StrategySelector};
pub use factory::{PerformanceMode, RetrievalSystem};

use crate::config::Config;
use crate::error::Result;
use crate::retrieval::{
    BackendStatus, HybridRetriever, QueryContext, Retriever, SearchResult, SharedRetriever,
};
use crate::wrappers::{
    CacheInfo, CachedRetriever, FanOut, MonitoredRetriever, PerformanceReport, ResultStream,
    StreamingRetriever, DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL, DEFAULT_MAX_WORKERS,
    DEFAULT_TASK_TIMEOUT, DEFAULT_TOTAL_TIMEOUT,
};
use indexmap::IndexMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::Span;

/// Which wrappers an `EnhancedRetriever` applies, and their sizing
#[derive(Debug, Clone, PartialEq)]
pub struct EnhancedOptions {
    pub enable_parallel: bool,
    pub enable_caching: bool,
    pub enable_monitoring: bool,
    pub cache_capacity: usize,
    pub cache_ttl: Duration,
    pub max_workers: usize,
    pub task_timeout: Duration,
    /// Bound on one whole fan-out
    pub parallel_timeout: Duration,
}

impl EnhancedOptions {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            enable_parallel: config.parallel.enabled,
            enable_caching: config.cache.enabled,
            enable_monitoring: config.monitoring.enabled,
            cache_capacity: config.cache.capacity,
            cache_ttl: config.cache.ttl(),
            max_workers: config.parallel.max_workers,
            task_timeout: config.parallel.task_timeout()?,
            parallel_timeout: config.parallel.total_timeout()?,
        })
    }

    fn fan_out(&self) -> Option<FanOut> {
        self.enable_parallel.then(|| {
            FanOut::new(self.max_workers, self.task_timeout, self.parallel_timeout)
        })
    }
}

impl Default for EnhancedOptions {
    fn default() -> Self {
        Self {
            enable_parallel: true,
            enable_caching: true,
            enable_monitoring: true,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            cache_ttl: DEFAULT_CACHE_TTL,
            max_workers: DEFAULT_MAX_WORKERS,
            task_timeout: DEFAULT_TASK_TIMEOUT,
            parallel_timeout: DEFAULT_TOTAL_TIMEOUT,
        }
    }
}

/// Combined statistics of an enhanced stack
#[derive(Debug, Clone, Serialize)]
pub struct EnhancedReport {
    pub retriever_type: String,
    pub parallel_enabled: bool,
    pub caching_enabled: bool,
    pub monitoring_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performance: Option<PerformanceReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_info: Option<CacheInfo>,
    pub backends: IndexMap<String, BackendStatus>,
}

/// Hybrid retriever wrapped in monitoring and caching
///
/// Wrap order is fixed: monitoring sits directly on the hybrid retriever
/// and caching wraps the result, so a cache hit skips both the fan-out and
/// the latency accounting. The cache and monitor are also kept by role so
/// reports and cache control never need to walk the chain.
pub struct EnhancedRetriever {
    base: Arc<HybridRetriever>,
    outer: SharedRetriever,
    cache: Option<Arc<CachedRetriever>>,
    monitor: Option<Arc<MonitoredRetriever>>,
    options: EnhancedOptions,
    span: Span,
}

impl EnhancedRetriever {
    pub fn new(hybrid: HybridRetriever, options: EnhancedOptions) -> Self {
        let span = tracing::info_span!("enhanced_retriever");
        let base = Arc::new(hybrid.with_fan_out(options.fan_out()));
        let mut outer: SharedRetriever = base.clone();

        let monitor = options.enable_monitoring.then(|| {
            Arc::new(MonitoredRetriever::new(Arc::clone(&outer)).with_span(span.clone()))
        });
        if let Some(monitor) = &monitor {
            outer = monitor.clone();
        }

        let cache = options.enable_caching.then(|| {
            Arc::new(
                CachedRetriever::new(Arc::clone(&outer), options.cache_capacity, options.cache_ttl)
                    .with_span(span.clone()),
            )
        });
        if let Some(cache) = &cache {
            outer = cache.clone();
        }

        tracing::info!(
            "Enhanced retriever ready: parallel={}, caching={}, monitoring={}",
            options.enable_parallel,
            options.enable_caching,
            options.enable_monitoring
        );

        Self {
            base,
            outer,
            cache,
            monitor,
            options,
            span,
        }
    }

    pub fn base(&self) -> &Arc<HybridRetriever> {
        &self.base
    }

    pub fn options(&self) -> &EnhancedOptions {
        &self.options
    }

    pub fn performance_report(&self) -> EnhancedReport {
        EnhancedReport {
            retriever_type: "enhanced_hybrid".to_string(),
            parallel_enabled: self.options.enable_parallel,
            caching_enabled: self.options.enable_caching,
            monitoring_enabled: self.options.enable_monitoring,
            performance: self.monitor.as_ref().map(|m| m.report()),
            cache_info: self.cache.as_ref().map(|c| c.cache_info()),
            backends: self.base.retriever_status().clone(),
        }
    }

    /// Empty the result cache, if this stack has one
    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
            tracing::info!("Enhanced retriever cache cleared");
        }
    }

    /// Stream raw backend results for the backends `context` selects
    ///
    /// The stream stops after `2 * top_k` results.
    pub fn stream_search(&self, context: &QueryContext, batch_size: usize) -> ResultStream {
        StreamingRetriever::new(self.base.select_backends(context))
            .with_batch_size(batch_size)
            .with_max_total_results(context.top_k().saturating_mul(2))
            .with_span(self.span.clone())
            .stream_search(context)
    }
}

impl Retriever for EnhancedRetriever {
    fn search(&self, context: &QueryContext) -> Result<Vec<SearchResult>> {
        self.outer.search(context)
    }

    fn name(&self) -> String {
        "enhanced_hybrid".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::Metadata;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        calls: AtomicUsize,
    }

    impl Retriever for Counting {
        fn search(&self, context: &QueryContext) -> Result<Vec<SearchResult>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok((0..context.top_k())
                .map(|i| {
                    let id = format!("doc{}", i);
                    SearchResult::new(id.clone(), id, 0.9 - i as f32 * 0.01, "dense", Metadata::new())
                })
                .collect())
        }

        fn name(&self) -> String {
            "counting".to_string()
        }
    }

    fn hybrid(backend: Arc<Counting>) -> HybridRetriever {
        HybridRetriever::builder()
            .retriever("dense", backend)
            .build()
            .unwrap()
    }

    #[test]
    fn test_cache_hit_skips_monitor_and_backend() {
        let backend = Arc::new(Counting::default());
        let enhanced = EnhancedRetriever::new(hybrid(backend.clone()), EnhancedOptions::default());
        let context = QueryContext::new("rust ownership rules").unwrap();

        let first = enhanced.search(&context).unwrap();
        let second = enhanced.search(&context).unwrap();

        assert_eq!(first, second);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);

        let report = enhanced.performance_report();
        assert_eq!(report.retriever_type, "enhanced_hybrid");
        assert_eq!(report.performance.unwrap().total_searches, 1);
        assert_eq!(report.cache_info.unwrap().hits, 1);
        assert!(report.backends["dense"].is_ready());
    }

    #[test]
    fn test_disabled_wrappers_are_absent() {
        let backend = Arc::new(Counting::default());
        let options = EnhancedOptions {
            enable_parallel: false,
            enable_caching: false,
            enable_monitoring: false,
            ..EnhancedOptions::default()
        };
        let enhanced = EnhancedRetriever::new(hybrid(backend.clone()), options);
        let context = QueryContext::new("q").unwrap();

        enhanced.search(&context).unwrap();
        enhanced.search(&context).unwrap();
        enhanced.clear_cache();

        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
        assert!(!enhanced.base().is_parallel());
        let report = enhanced.performance_report();
        assert!(report.performance.is_none());
        assert!(report.cache_info.is_none());
    }

    #[test]
    fn test_clear_cache_forces_refetch() {
        let backend = Arc::new(Counting::default());
        let enhanced = EnhancedRetriever::new(hybrid(backend.clone()), EnhancedOptions::default());
        let context = QueryContext::new("q").unwrap();

        enhanced.search(&context).unwrap();
        enhanced.clear_cache();
        enhanced.search(&context).unwrap();

        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_stream_search_is_bounded_by_twice_top_k() {
        let enhanced = EnhancedRetriever::new(
            hybrid(Arc::new(Counting::default())),
            EnhancedOptions::default(),
        );
        let context = QueryContext::builder("q").top_k(3).build().unwrap();

        let streamed: Vec<SearchResult> = enhanced.stream_search(&context, 2).collect();

        // The backend returns top_k = 3 items, below the 6-item ceiling
        assert_eq!(streamed.len(), 3);
    }
}
