mod common;

use common::{CountingRetriever, FailingRetriever, StaticRetriever};
use meld::config::Config;
use meld::enhanced::{
    EnhancedOptions, EnhancedRetriever, PerformanceMode, RetrievalSystem, SearchStrategy,
};
use meld::error::BackendUnavailable;
use meld::retrieval::{BackendHandle, BackendStatus, HybridRetriever, QueryContext, Retriever};
use std::collections::HashSet;

fn hits(prefix: &str, count: usize) -> Vec<(String, f32)> {
    (0..count)
        .map(|i| (format!("{}{}", prefix, i), 1.0 - i as f32 / 100.0))
        .collect()
}

fn static_backend(name: &str, hits: &[(String, f32)]) -> BackendHandle {
    let borrowed: Vec<(&str, f32)> = hits.iter().map(|(id, s)| (id.as_str(), *s)).collect();
    Ok(StaticRetriever::shared(name, &borrowed))
}

#[test]
fn test_system_from_config() {
    let config = Config::default();
    let system = RetrievalSystem::from_config(
        &config,
        vec![
            ("dense", static_backend("dense", &hits("d", 10))),
            ("sparse_bm25", static_backend("sparse_bm25", &hits("d", 10))),
            (
                "graph_neo4j",
                Err(BackendUnavailable::new("graph_neo4j", "neo4j driver missing")),
            ),
        ],
    )
    .unwrap();

    assert_eq!(system.mode, PerformanceMode::Balanced);
    assert!(system.base.is_parallel());

    let context = QueryContext::new("how does the fusion work here").unwrap();
    let results = system.adaptive.search(&context).unwrap();
    assert_eq!(results.len(), 5);

    let report = system.enhanced.performance_report();
    assert_eq!(report.backends.len(), 3);
    assert_eq!(
        report.backends["graph_neo4j"],
        BackendStatus::Unavailable("neo4j driver missing".to_string())
    );
    assert_eq!(report.cache_info.unwrap().misses, 1);
}

#[test]
fn test_adaptive_streaming_path_deduplicates() {
    let system = RetrievalSystem::build(
        HybridRetriever::builder()
            .retriever("dense", {
                let h = hits("d", 30);
                let b: Vec<(&str, f32)> = h.iter().map(|(id, s)| (id.as_str(), *s)).collect();
                StaticRetriever::shared("dense", &b)
            })
            .retriever("sparse", {
                let h = hits("d", 30);
                let b: Vec<(&str, f32)> = h.iter().map(|(id, s)| (id.as_str(), *s)).collect();
                StaticRetriever::shared("sparse", &b)
            })
            .build()
            .unwrap(),
        PerformanceMode::Balanced,
    )
    .unwrap();

    let context = QueryContext::builder("show every document")
        .top_k(25)
        .build()
        .unwrap();
    assert_eq!(
        system.adaptive.selector().select(&context),
        SearchStrategy::Streaming
    );

    let results = system.adaptive.search(&context).unwrap();

    assert_eq!(results.len(), 25);
    let unique: HashSet<&str> = results.iter().map(|r| r.id()).collect();
    assert_eq!(unique.len(), results.len());
    // Streaming bypasses the cache entirely
    assert_eq!(system.enhanced.performance_report().cache_info.unwrap().misses, 0);
}

#[test]
fn test_cached_path_hits_cache() {
    let backend = CountingRetriever::new();
    let system = RetrievalSystem::build(
        HybridRetriever::builder()
            .retriever("dense", backend.clone())
            .build()
            .unwrap(),
        PerformanceMode::Speed,
    )
    .unwrap();

    let context = QueryContext::new("what is rrf").unwrap();
    assert_eq!(system.adaptive.selector().select(&context), SearchStrategy::Cached);

    system.adaptive.search(&context).unwrap();
    system.adaptive.search(&context).unwrap();

    assert_eq!(backend.calls(), 1);
    let report = system.enhanced.performance_report();
    assert!(report.performance.is_none());
    assert_eq!(report.cache_info.unwrap().hits, 1);
}

#[test]
fn test_monitor_sees_degraded_backends_as_success() {
    let hybrid = HybridRetriever::builder()
        .retriever("dense", FailingRetriever::shared())
        .build()
        .unwrap();
    let enhanced = EnhancedRetriever::new(
        hybrid,
        EnhancedOptions {
            enable_caching: false,
            ..EnhancedOptions::default()
        },
    );

    let results = enhanced.search(&QueryContext::new("anything at all").unwrap()).unwrap();

    assert!(results.is_empty());
    let performance = enhanced.performance_report().performance.unwrap();
    assert_eq!(performance.total_searches, 1);
    assert_eq!(performance.error_count, 0);
}

#[test]
fn test_report_serializes() {
    let enhanced = EnhancedRetriever::new(
        HybridRetriever::builder()
            .retriever("dense", StaticRetriever::shared("dense", &[("a", 0.5)]))
            .build()
            .unwrap(),
        EnhancedOptions::default(),
    );
    enhanced.search(&QueryContext::new("q").unwrap()).unwrap();

    let json = serde_json::to_value(enhanced.performance_report()).unwrap();

    assert_eq!(json["retriever_type"], "enhanced_hybrid");
    assert_eq!(json["backends"]["dense"]["state"], "ready");
    assert_eq!(json["performance"]["retriever_name"], "hybrid_multi_modal");
    assert_eq!(json["cache_info"]["size"], 1);
}

#[test]
fn test_unbounded_parallel_timeout() {
    let enhanced = EnhancedRetriever::new(
        HybridRetriever::builder()
            .retriever("dense", StaticRetriever::shared("dense", &[("a", 0.5)]))
            .retriever("sparse", StaticRetriever::shared("sparse", &[("b", 0.4)]))
            .build()
            .unwrap(),
        EnhancedOptions {
            parallel_timeout: std::time::Duration::MAX,
            ..EnhancedOptions::default()
        },
    );

    let results = enhanced.search(&QueryContext::new("q").unwrap()).unwrap();

    assert_eq!(results.len(), 2);
}
