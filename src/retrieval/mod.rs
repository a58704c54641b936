//! Hybrid retrieval and rank fusion
//!
//! This module holds the shared vocabulary (`SearchResult`, `QueryContext`),
//! the `Retriever` capability every backend and wrapper implements, the
//! fusion strategies, and the hybrid retriever that ties them together.

mod deduplication;
pub mod fusion;
mod hybrid;
mod query;
mod result;
mod retriever;

pub use deduplication::deduplicate_results;
pub use fusion::{
    AdaptiveFusion, AdaptiveRules, BordaCountFusion, Fusion, FusionRegistry,
    ReciprocalRankFusion, SourceResults, SourceWeights, WeightedSumFusion,
};
pub use hybrid::{HybridRetriever, HybridRetrieverBuilder};
pub use query::{
    Filters, FusionMethod, QueryContext, QueryContextBuilder, SearchType, DEFAULT_TOP_K,
    MAX_TOP_K,
};
pub use result::{normalize_score, Metadata, SearchResult};
pub use retriever::{BackendHandle, BackendStatus, NamedRetrievers, Retriever, SharedRetriever};
