//! Rule-based choice of fusion strategy per query

use super::{
    BordaCountFusion, Fusion, ReciprocalRankFusion, SourceResults, WeightedSumFusion,
};
use crate::config::AdaptiveFusionConfig;
use crate::retrieval::{FusionMethod, QueryContext, SearchResult};

/// Query features that decide which strategy the adaptive fusion uses
#[derive(Debug, Clone)]
pub struct AdaptiveRules {
    /// Queries with at most this many tokens use RRF
    pub short_query_max_tokens: usize,
    /// Lowercased terms marking a query as technical
    pub technical_terms: Vec<String>,
}

impl AdaptiveRules {
    /// Strategy for this query: short ⇒ RRF, technical ⇒ weighted sum,
    /// anything else ⇒ Borda count
    pub fn choose(&self, context: &QueryContext) -> FusionMethod {
        if context.token_count() <= self.short_query_max_tokens {
            return FusionMethod::ReciprocalRank;
        }

        let query = context.normalized_query();
        if self.technical_terms.iter().any(|term| query.contains(term.as_str())) {
            return FusionMethod::WeightedSum;
        }

        FusionMethod::BordaCount
    }
}

impl From<&AdaptiveFusionConfig> for AdaptiveRules {
    fn from(config: &AdaptiveFusionConfig) -> Self {
        Self {
            short_query_max_tokens: config.short_query_max_tokens,
            technical_terms: config
                .technical_terms
                .iter()
                .map(|t| t.to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }
}

impl Default for AdaptiveRules {
    fn default() -> Self {
        Self::from(&AdaptiveFusionConfig::default())
    }
}

/// Adaptive fusion that chooses strategy based on query characteristics
#[derive(Debug, Clone)]
pub struct AdaptiveFusion {
    rrf: ReciprocalRankFusion,
    weighted: WeightedSumFusion,
    borda: BordaCountFusion,
    rules: AdaptiveRules,
}

impl AdaptiveFusion {
    pub fn new(rrf: ReciprocalRankFusion, weighted: WeightedSumFusion, rules: AdaptiveRules) -> Self {
        Self {
            rrf,
            weighted,
            borda: BordaCountFusion,
            rules,
        }
    }

    pub fn rules(&self) -> &AdaptiveRules {
        &self.rules
    }
}

impl Default for AdaptiveFusion {
    fn default() -> Self {
        Self::new(
            ReciprocalRankFusion::default(),
            WeightedSumFusion::default(),
            AdaptiveRules::default(),
        )
    }
}

impl Fusion for AdaptiveFusion {
    fn fuse(
        &self,
        results_by_source: &SourceResults,
        context: &QueryContext,
    ) -> Vec<SearchResult> {
        let chosen = self.rules.choose(context);
        tracing::debug!("Adaptive fusion chose {} for query", chosen);

        match chosen {
            FusionMethod::ReciprocalRank => self.rrf.fuse(results_by_source, context),
            FusionMethod::WeightedSum => self.weighted.fuse(results_by_source, context),
            _ => self.borda.fuse(results_by_source, context),
        }
    }

    fn method(&self) -> FusionMethod {
        FusionMethod::Adaptive
    }
}
