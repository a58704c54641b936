//! Rank fusion strategies for combining per-source result lists
//!
//! Every strategy takes `{source: ranked results}` and returns at most
//! `top_k` results, best first, with one entry per result id. The first
//! occurrence of an id (in source order, then rank order) supplies its
//! content and metadata; only the score is re-derived.

mod adaptive;
mod borda;
mod rrf;
mod weighted;

pub use adaptive::{AdaptiveFusion, AdaptiveRules};
pub use borda::BordaCountFusion;
pub use rrf::{ReciprocalRankFusion, DEFAULT_RRF_K};
pub use weighted::{SourceWeights, WeightedSumFusion};

use crate::config::FusionConfig;
use crate::error::Result;
use crate::retrieval::{normalize_score, FusionMethod, Metadata, QueryContext, SearchResult};
use ahash::AHashMap;
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Ranked results keyed by source, in the order sources were consulted
pub type SourceResults = IndexMap<String, Vec<SearchResult>>;

/// A strategy turning several ranked lists into one
pub trait Fusion: Send + Sync {
    /// Combine results from multiple retrievers
    fn fuse(&self, results_by_source: &SourceResults, context: &QueryContext)
        -> Vec<SearchResult>;

    /// Method this strategy implements
    fn method(&self) -> FusionMethod;
}

/// Named fusion strategies available to a retriever
#[derive(Clone)]
pub struct FusionRegistry {
    strategies: HashMap<String, Arc<dyn Fusion>>,
}

impl FusionRegistry {
    /// Registry holding the built-in strategies configured from `config`
    pub fn new(config: &FusionConfig) -> Result<Self> {
        let rrf = ReciprocalRankFusion::new(config.rrf_k)?;
        let weighted = WeightedSumFusion::new(SourceWeights::new(config.source_weights.clone())?);
        let borda = BordaCountFusion;
        let adaptive = AdaptiveFusion::new(
            rrf.clone(),
            weighted.clone(),
            AdaptiveRules::from(&config.adaptive),
        );

        let mut registry = Self {
            strategies: HashMap::new(),
        };
        registry.register_strategy(Arc::new(rrf));
        registry.register_strategy(Arc::new(weighted));
        registry.register_strategy(Arc::new(borda));
        registry.register_strategy(Arc::new(adaptive));
        Ok(registry)
    }

    /// Register a strategy under an explicit name
    pub fn register(&mut self, name: impl Into<String>, strategy: Arc<dyn Fusion>) {
        self.strategies.insert(name.into(), strategy);
    }

    fn register_strategy(&mut self, strategy: Arc<dyn Fusion>) {
        let name = strategy.method().as_str().to_string();
        self.register(name, strategy);
    }

    /// Look up the strategy for `method`
    pub fn get(&self, method: &FusionMethod) -> Option<Arc<dyn Fusion>> {
        self.strategies.get(method.as_str()).cloned()
    }

    pub fn contains(&self, method: &FusionMethod) -> bool {
        self.strategies.contains_key(method.as_str())
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.strategies.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for FusionRegistry {
    fn default() -> Self {
        let rrf = ReciprocalRankFusion::default();
        let weighted = WeightedSumFusion::default();
        let adaptive = AdaptiveFusion::new(rrf.clone(), weighted.clone(), AdaptiveRules::default());

        let mut registry = Self {
            strategies: HashMap::new(),
        };
        registry.register_strategy(Arc::new(rrf));
        registry.register_strategy(Arc::new(weighted));
        registry.register_strategy(Arc::new(BordaCountFusion));
        registry.register_strategy(Arc::new(adaptive));
        registry
    }
}

impl std::fmt::Debug for FusionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FusionRegistry")
            .field("strategies", &self.names())
            .finish()
    }
}

/// Accumulates per-id scores, remembering first-seen order and result
struct ScoreBoard<'a> {
    order: Vec<&'a str>,
    entries: AHashMap<&'a str, (&'a SearchResult, f32)>,
}

impl<'a> ScoreBoard<'a> {
    fn new() -> Self {
        Self {
            order: Vec::new(),
            entries: AHashMap::new(),
        }
    }

    fn add(&mut self, result: &'a SearchResult, points: f32) {
        let order = &mut self.order;
        self.entries
            .entry(result.id())
            .or_insert_with(|| {
                order.push(result.id());
                (result, 0.0)
            })
            .1 += points;
    }

    fn max_score(&self) -> f32 {
        self.entries
            .values()
            .map(|(_, score)| *score)
            .fold(0.0, f32::max)
    }

    /// Entries sorted by the score callers will see, ties kept in
    /// first-seen order
    ///
    /// Raw totals above 1.0 are compressed by `normalize_score`, so two
    /// raw totals can swap places once exposed. Ranking on the exposed
    /// score keeps the output descending.
    fn into_ranked(self, top_k: usize) -> Vec<(&'a SearchResult, f32)> {
        let mut ranked: Vec<(&'a SearchResult, f32)> = self
            .order
            .iter()
            .filter_map(|id| self.entries.get(id).copied())
            .collect();

        ranked.sort_by(|a, b| {
            normalize_score(b.1)
                .partial_cmp(&normalize_score(a.1))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked.truncate(top_k);
        ranked
    }
}

/// Build the fused copy of `first`, recording where it came from
fn fused_result(
    first: &SearchResult,
    score: f32,
    source: &str,
    method: &FusionMethod,
    extra: impl IntoIterator<Item = (&'static str, Value)>,
) -> SearchResult {
    let mut metadata: Metadata = first.metadata().clone();
    metadata.insert("original_score".to_string(), Value::from(first.score()));
    metadata.insert(
        "original_source".to_string(),
        Value::from(first.source().to_string()),
    );
    for (key, value) in extra {
        metadata.insert(key.to_string(), value);
    }
    metadata.insert(
        "fusion_method".to_string(),
        Value::from(method.as_str().to_string()),
    );

    SearchResult::new(first.id(), first.content(), score, source, metadata)
}
