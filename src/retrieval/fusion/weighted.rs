//! Weighted sum of per-source min-max normalized scores

use super::{fused_result, Fusion, ScoreBoard, SourceResults};
use crate::error::{MeldError, Result};
use crate::retrieval::{FusionMethod, QueryContext, SearchResult, SearchType};
use serde_json::Value;
use std::collections::HashMap;

/// Built-in weights for the usual backend keys and their families
const DEFAULT_WEIGHTS: &[(&str, f32)] = &[
    ("dense", 1.0),
    ("sparse_tfidf", 0.8),
    ("sparse_bm25", 0.8),
    ("fulltext_whoosh", 0.6),
    ("fulltext_elasticsearch", 0.7),
    ("graph_neo4j", 0.5),
    ("graph_path", 0.3),
    ("sparse", 0.8),
    ("fulltext", 0.7),
    ("graph", 0.5),
];

/// Weight used for sources nothing else matches
const FALLBACK_WEIGHT: f32 = 1.0;

/// Per-source weights
///
/// Lookup order: exact source name, then the source's search-type
/// family (`sparse_bm25` falls back to `sparse`), then 1.0.
#[derive(Debug, Clone)]
pub struct SourceWeights {
    weights: HashMap<String, f32>,
}

impl SourceWeights {
    /// Built-in table with `overrides` layered on top
    pub fn new(overrides: HashMap<String, f32>) -> Result<Self> {
        if let Some((source, weight)) = overrides
            .iter()
            .find(|(_, w)| !(w.is_finite() && **w >= 0.0))
        {
            return Err(MeldError::InvalidConfigValue {
                path: format!("fusion.source_weights.{}", source),
                message: format!("Weight must be non-negative, got {}", weight),
            });
        }

        let mut weights = Self::default().weights;
        weights.extend(overrides);
        Ok(Self { weights })
    }

    pub fn weight_for(&self, source: &str) -> f32 {
        if let Some(weight) = self.weights.get(source) {
            return *weight;
        }

        SearchType::of_backend(source)
            .and_then(|family| self.weights.get(family.as_str()))
            .copied()
            .unwrap_or(FALLBACK_WEIGHT)
    }
}

impl Default for SourceWeights {
    fn default() -> Self {
        Self {
            weights: DEFAULT_WEIGHTS
                .iter()
                .map(|(name, weight)| (name.to_string(), *weight))
                .collect(),
        }
    }
}

/// Weighted sum fusion with configurable source weights
///
/// Each source's scores are rescaled to `[0, 1]` using that source's own
/// min and max; a source whose scores are all equal maps every item to
/// 1.0. The rescaled scores are then summed with per-source weights.
#[derive(Debug, Clone, Default)]
pub struct WeightedSumFusion {
    weights: SourceWeights,
}

impl WeightedSumFusion {
    pub fn new(weights: SourceWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &SourceWeights {
        &self.weights
    }
}

/// Min-max rescale of one source's scores
fn normalized_scores(results: &[SearchResult]) -> Vec<f32> {
    let (min, max) = results.iter().fold((f32::MAX, f32::MIN), |(lo, hi), r| {
        (lo.min(r.score()), hi.max(r.score()))
    });

    if max > min {
        let range = max - min;
        results.iter().map(|r| (r.score() - min) / range).collect()
    } else {
        vec![1.0; results.len()]
    }
}

impl Fusion for WeightedSumFusion {
    fn fuse(
        &self,
        results_by_source: &SourceResults,
        context: &QueryContext,
    ) -> Vec<SearchResult> {
        let mut board = ScoreBoard::new();

        for (source, results) in results_by_source {
            if results.is_empty() {
                continue;
            }

            let weight = self.weights.weight_for(source);
            for (result, normalized) in results.iter().zip(normalized_scores(results)) {
                board.add(result, normalized * weight);
            }
        }

        let method = self.method();
        board
            .into_ranked(context.top_k())
            .into_iter()
            .map(|(first, score)| {
                fused_result(
                    first,
                    score,
                    "fusion_weighted",
                    &method,
                    [("weighted_score", Value::from(score))],
                )
            })
            .collect()
    }

    fn method(&self) -> FusionMethod {
        FusionMethod::WeightedSum
    }
}
