//! Borda count fusion based on ranking positions

use super::{fused_result, Fusion, ScoreBoard, SourceResults};
use crate::retrieval::{FusionMethod, QueryContext, SearchResult};
use serde_json::Value;

/// Borda count fusion
///
/// A source returning `n` items gives the item at 0-based position `p`
/// `n - p` points. Points are summed across sources and divided by the
/// best total.
#[derive(Debug, Clone, Copy, Default)]
pub struct BordaCountFusion;

impl Fusion for BordaCountFusion {
    fn fuse(
        &self,
        results_by_source: &SourceResults,
        context: &QueryContext,
    ) -> Vec<SearchResult> {
        let mut board = ScoreBoard::new();

        for results in results_by_source.values() {
            let n = results.len();
            for (position, result) in results.iter().enumerate() {
                board.add(result, (n - position) as f32);
            }
        }

        let max_points = board.max_score().max(1.0);
        let method = self.method();

        board
            .into_ranked(context.top_k())
            .into_iter()
            .map(|(first, points)| {
                let normalized = points / max_points;
                fused_result(
                    first,
                    normalized,
                    "fusion_borda",
                    &method,
                    [
                        ("borda_score", Value::from(points.round() as u64)),
                        ("normalized_borda", Value::from(normalized)),
                    ],
                )
            })
            .collect()
    }

    fn method(&self) -> FusionMethod {
        FusionMethod::BordaCount
    }
}
