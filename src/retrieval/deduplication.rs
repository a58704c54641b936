//! Result deduplication by id

use crate::retrieval::SearchResult;
use std::collections::HashSet;

/// Deduplicate results by id, keeping the first occurrence
///
/// # Arguments
/// * `results` - Results potentially containing the same id more than once
///
/// # Returns
/// Deduplicated results, maintaining input order
pub fn deduplicate_results(results: Vec<SearchResult>) -> Vec<SearchResult> {
    let mut seen: HashSet<String> = HashSet::new();

    results
        .into_iter()
        .filter(|result| seen.insert(result.id().to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::Metadata;

    #[test]
    fn test_deduplication() {
        let results = vec![
            SearchResult::new("1", "text1", 0.9, "dense", Metadata::new()),
            SearchResult::new("2", "text2", 0.8, "sparse_bm25", Metadata::new()),
            SearchResult::new("1", "text1", 0.7, "graph", Metadata::new()), // Duplicate
        ];

        let deduped = deduplicate_results(results);

        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].id(), "1");
        assert_eq!(deduped[0].score(), 0.9); // Keeps first
        assert_eq!(deduped[0].source(), "dense");
    }
}
