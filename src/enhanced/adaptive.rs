//! Per-request choice between streaming, cached and parallel search

use super::EnhancedRetriever;
use crate::config::StrategyConfig;
use crate::error::Result;
use crate::retrieval::{deduplicate_results, QueryContext, Retriever, SearchResult};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, Span};

/// Execution path picked for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchStrategy {
    Streaming,
    Cached,
    Parallel,
}

impl SearchStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchStrategy::Streaming => "streaming",
            SearchStrategy::Cached => "cached",
            SearchStrategy::Parallel => "parallel",
        }
    }
}

impl fmt::Display for SearchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rule-based strategy selection
#[derive(Debug, Clone)]
pub struct StrategySelector {
    streaming_top_k_threshold: usize,
    streaming_terms: Vec<String>,
    cached_max_tokens: usize,
    cached_terms: Vec<String>,
}

fn lowercase_terms(terms: &[String]) -> Vec<String> {
    terms
        .iter()
        .map(|t| t.to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

impl StrategySelector {
    /// Large or "give me everything" requests stream; short or common
    /// informational queries take the cached path; the rest run in
    /// parallel.
    pub fn select(&self, context: &QueryContext) -> SearchStrategy {
        let query = context.normalized_query();
        let contains_any = |terms: &[String]| terms.iter().any(|t| query.contains(t.as_str()));

        if context.top_k() > self.streaming_top_k_threshold || contains_any(&self.streaming_terms) {
            return SearchStrategy::Streaming;
        }

        if context.token_count() <= self.cached_max_tokens || contains_any(&self.cached_terms) {
            return SearchStrategy::Cached;
        }

        SearchStrategy::Parallel
    }
}

impl From<&StrategyConfig> for StrategySelector {
    fn from(config: &StrategyConfig) -> Self {
        Self {
            streaming_top_k_threshold: config.streaming_top_k_threshold,
            streaming_terms: lowercase_terms(&config.streaming_terms),
            cached_max_tokens: config.cached_max_tokens,
            cached_terms: lowercase_terms(&config.cached_terms),
        }
    }
}

impl Default for StrategySelector {
    fn default() -> Self {
        Self::from(&StrategyConfig::default())
    }
}

/// Enhanced retriever that picks an execution path per request
pub struct AdaptiveRetriever {
    enhanced: Arc<EnhancedRetriever>,
    selector: StrategySelector,
    streaming_batch_size: usize,
    span: Span,
}

impl AdaptiveRetriever {
    pub fn new(enhanced: Arc<EnhancedRetriever>, config: &StrategyConfig) -> Self {
        Self {
            enhanced,
            selector: StrategySelector::from(config),
            streaming_batch_size: config.streaming_batch_size.max(1),
            span: tracing::info_span!("adaptive_retriever"),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn selector(&self) -> &StrategySelector {
        &self.selector
    }

    pub fn enhanced(&self) -> &Arc<EnhancedRetriever> {
        &self.enhanced
    }
}

impl Retriever for AdaptiveRetriever {
    fn search(&self, context: &QueryContext) -> Result<Vec<SearchResult>> {
        let _entered = self.span.enter();
        let strategy = self.selector.select(context);
        debug!("Using {} strategy", strategy);

        match strategy {
            SearchStrategy::Streaming => {
                let streamed: Vec<SearchResult> = self
                    .enhanced
                    .stream_search(context, self.streaming_batch_size)
                    .collect();
                let mut results = deduplicate_results(streamed);
                results.truncate(context.top_k());
                Ok(results)
            }
            // The cache sits inside the enhanced stack, so both paths share it
            SearchStrategy::Cached | SearchStrategy::Parallel => self.enhanced.search(context),
        }
    }

    fn name(&self) -> String {
        "adaptive_enhanced".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn select(query: &str, top_k: usize) -> SearchStrategy {
        let context = QueryContext::builder(query).top_k(top_k).build().unwrap();
        StrategySelector::default().select(&context)
    }

    #[test]
    fn test_strategy_rules() {
        assert_eq!(select("kernel scheduling latency tuning", 25), SearchStrategy::Streaming);
        assert_eq!(select("please list all open incidents today", 5), SearchStrategy::Streaming);
        assert_eq!(select("設定 一覧 を 表示 して", 5), SearchStrategy::Streaming);
        assert_eq!(select("rust lifetimes", 5), SearchStrategy::Cached);
        assert_eq!(select("what is a borrow checker error", 5), SearchStrategy::Cached);
        assert_eq!(
            select("compare tokio and async-std executors in depth", 5),
            SearchStrategy::Parallel
        );
    }

    #[test]
    fn test_thresholds_come_from_config() {
        let selector = StrategySelector::from(&StrategyConfig {
            streaming_top_k_threshold: 2,
            streaming_terms: vec![],
            cached_max_tokens: 0,
            cached_terms: vec!["FAQ".to_string()],
            streaming_batch_size: 3,
        });

        let ctx = |q: &str, k: usize| QueryContext::builder(q).top_k(k).build().unwrap();
        assert_eq!(selector.select(&ctx("anything", 3)), SearchStrategy::Streaming);
        assert_eq!(selector.select(&ctx("the faq page", 2)), SearchStrategy::Cached);
        assert_eq!(selector.select(&ctx("the help page", 2)), SearchStrategy::Parallel);
    }
}
