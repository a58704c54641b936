//! Scored search hits

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

/// Open provenance bag attached to every result
pub type Metadata = HashMap<String, Value>;

/// Scores above 1.0 are treated as raw scores on a 0..=10 scale
const RAW_SCORE_CEILING: f32 = 10.0;

/// One scored hit produced by a backend or a fusion stage
///
/// Results are value objects: every transformation builds a new one, so
/// the fields are only reachable through accessors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    id: String,
    content: String,
    score: f32,
    source: String,
    metadata: Metadata,
}

impl SearchResult {
    /// Create a new result, normalizing `score` into `[0, 1]`
    pub fn new(
        id: impl Into<String>,
        content: impl Into<String>,
        score: f32,
        source: impl Into<String>,
        metadata: Metadata,
    ) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            score: normalize_score(score),
            source: source.into(),
            metadata,
        }
    }

    /// Stable identity used for cross-source de-duplication
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Normalized relevance score (0.0 to 1.0, higher is better)
    pub fn score(&self) -> f32 {
        self.score
    }

    /// Retriever or fusion stage that produced this result
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Get a short preview of the content (first N characters)
    pub fn preview(&self, max_chars: usize) -> String {
        match self.content.char_indices().nth(max_chars) {
            Some((cut, _)) => format!("{}...", &self.content[..cut]),
            None => self.content.clone(),
        }
    }
}

/// Map any producer's score onto `[0, 1]`
///
/// Negative scores clamp to 0. Scores above 1 are read as raw scores up
/// to 10 and scaled down. NaN is treated as no relevance.
pub fn normalize_score(score: f32) -> f32 {
    if score.is_nan() || score < 0.0 {
        0.0
    } else if score > 1.0 {
        (score.min(RAW_SCORE_CEILING) / RAW_SCORE_CEILING).clamp(0.0, 1.0)
    } else {
        score
    }
}
