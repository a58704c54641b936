//! Latency and volume accounting around any retriever

use crate::error::Result;
use crate::retrieval::{QueryContext, Retriever, SearchResult, SharedRetriever};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, error, Span};

#[derive(Debug, Clone, Default)]
struct Metrics {
    total_searches: u64,
    total_time_secs: f64,
    total_results: u64,
    error_count: u64,
    last_search_at: Option<DateTime<Utc>>,
}

/// Snapshot of a monitored retriever's counters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceReport {
    pub retriever_name: String,
    pub total_searches: u64,
    pub total_time_secs: f64,
    pub total_results: u64,
    pub error_count: u64,
    pub average_time_secs: f64,
    pub average_results: f64,
    pub error_rate: f64,
    pub last_search_at: Option<DateTime<Utc>>,
}

/// Performance monitoring wrapper
///
/// Unlike the other wrappers this one never absorbs a failure: errors are
/// counted, logged and returned to the caller unchanged.
pub struct MonitoredRetriever {
    inner: SharedRetriever,
    metrics: Mutex<Metrics>,
    span: Span,
}

impl MonitoredRetriever {
    pub fn new(inner: SharedRetriever) -> Self {
        Self {
            inner,
            metrics: Mutex::new(Metrics::default()),
            span: tracing::info_span!("monitored_retriever"),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn report(&self) -> PerformanceReport {
        let metrics = self.metrics.lock().clone();
        // Averages cover successful searches only
        let succeeded = metrics.total_searches.saturating_sub(metrics.error_count);
        let average = |total: f64| {
            if succeeded > 0 {
                total / succeeded as f64
            } else {
                0.0
            }
        };

        PerformanceReport {
            retriever_name: self.inner.name(),
            total_searches: metrics.total_searches,
            total_time_secs: metrics.total_time_secs,
            total_results: metrics.total_results,
            error_count: metrics.error_count,
            average_time_secs: average(metrics.total_time_secs),
            average_results: average(metrics.total_results as f64),
            error_rate: metrics.error_count as f64 / metrics.total_searches.max(1) as f64,
            last_search_at: metrics.last_search_at,
        }
    }

    /// Zero every counter
    pub fn reset(&self) {
        *self.metrics.lock() = Metrics::default();
    }
}

impl Retriever for MonitoredRetriever {
    fn search(&self, context: &QueryContext) -> Result<Vec<SearchResult>> {
        let _entered = self.span.enter();
        let started = Instant::now();

        let outcome = self.inner.search(context);
        let elapsed = started.elapsed().as_secs_f64();

        let mut metrics = self.metrics.lock();
        metrics.total_searches += 1;
        metrics.last_search_at = Some(Utc::now());

        match &outcome {
            Ok(results) => {
                metrics.total_time_secs += elapsed;
                metrics.total_results += results.len() as u64;
                drop(metrics);
                debug!(
                    "Search completed in {:.3}s, {} results",
                    elapsed,
                    results.len()
                );
            }
            Err(e) => {
                metrics.error_count += 1;
                drop(metrics);
                error!("Search failed after {:.3}s: {}", elapsed, e);
            }
        }

        outcome
    }

    fn name(&self) -> String {
        format!("monitored_{}", self.inner.name())
    }
}
