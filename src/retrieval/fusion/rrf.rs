//! Reciprocal Rank Fusion algorithm for combining search results

use super::{fused_result, Fusion, ScoreBoard, SourceResults};
use crate::error::{MeldError, Result};
use crate::retrieval::{FusionMethod, QueryContext, SearchResult};
use serde_json::Value;

/// Conventional RRF smoothing constant
pub const DEFAULT_RRF_K: f32 = 60.0;

/// Reciprocal Rank Fusion
///
/// RRF formula: score(id) = sum over all rankings of: 1 / (k + rank),
/// with 1-based ranks. Only positions matter, so sources with
/// incommensurable score scales fuse cleanly.
#[derive(Debug, Clone)]
pub struct ReciprocalRankFusion {
    k: f32,
}

impl ReciprocalRankFusion {
    pub fn new(k: f32) -> Result<Self> {
        if !(k.is_finite() && k > 0.0) {
            return Err(MeldError::InvalidConfigValue {
                path: "fusion.rrf_k".to_string(),
                message: format!("rrf_k must be positive, got {}", k),
            });
        }
        Ok(Self { k })
    }

    pub fn k(&self) -> f32 {
        self.k
    }
}

impl Default for ReciprocalRankFusion {
    fn default() -> Self {
        Self { k: DEFAULT_RRF_K }
    }
}

impl Fusion for ReciprocalRankFusion {
    fn fuse(
        &self,
        results_by_source: &SourceResults,
        context: &QueryContext,
    ) -> Vec<SearchResult> {
        let mut board = ScoreBoard::new();

        for results in results_by_source.values() {
            for (rank, result) in results.iter().enumerate() {
                board.add(result, 1.0 / (self.k + rank as f32 + 1.0));
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
                    "fusion_rrf",
                    &method,
                    [("rrf_score", Value::from(score))],
                )
            })
            .collect()
    }

    fn method(&self) -> FusionMethod {
        FusionMethod::ReciprocalRank
    }
}
