mod common;

use common::{ids, CountingRetriever, FailingRetriever, SlowRetriever, StaticRetriever};
use meld::retrieval::{NamedRetrievers, QueryContext, Retriever};
use meld::wrappers::{
    AsyncRetriever, CachedRetriever, FanOut, MonitoredRetriever, ParallelRetriever,
    StreamingRetriever,
};
use meld::MeldError;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn named(pairs: Vec<(&str, meld::retrieval::SharedRetriever)>) -> NamedRetrievers {
    pairs
        .into_iter()
        .map(|(name, retriever)| (name.to_string(), retriever))
        .collect()
}

#[test]
fn test_parallel_runs_backends_concurrently() {
    let retrievers = named(vec![
        ("a", SlowRetriever::shared("a", Duration::from_millis(150), &[("a1", 0.5)])),
        ("b", SlowRetriever::shared("b", Duration::from_millis(150), &[("b1", 0.5)])),
        ("c", SlowRetriever::shared("c", Duration::from_millis(150), &[("c1", 0.5)])),
    ]);
    let parallel = ParallelRetriever::new(retrievers, FanOut::default());

    let started = Instant::now();
    let results = parallel.search(&QueryContext::new("q").unwrap()).unwrap();

    assert_eq!(results.len(), 3);
    assert!(started.elapsed() < Duration::from_millis(400));
    assert_eq!(parallel.name(), "parallel_retriever(3)");
}

#[test]
fn test_parallel_keeps_registration_order_per_source() {
    let retrievers = named(vec![
        ("slow", SlowRetriever::shared("slow", Duration::from_millis(80), &[("s", 0.5)])),
        ("broken", FailingRetriever::shared()),
        ("fast", StaticRetriever::shared("fast", &[("f", 0.5)])),
    ]);
    let parallel = ParallelRetriever::new(retrievers, FanOut::default());

    let by_source = parallel.search_by_source(&QueryContext::new("q").unwrap());
    let sources: Vec<&str> = by_source.keys().map(String::as_str).collect();

    assert_eq!(sources, vec!["slow", "fast"]);
}

#[tokio::test]
async fn test_async_gathers_without_raising() {
    let retrievers = named(vec![
        ("dense", StaticRetriever::shared("dense", &[("a", 0.9)])),
        ("sparse", FailingRetriever::shared()),
        ("graph", StaticRetriever::shared("graph", &[("b", 0.4)])),
    ]);
    let retriever = AsyncRetriever::new(retrievers);

    let results = retriever
        .search_async(&QueryContext::new("q").unwrap())
        .await
        .unwrap();

    assert_eq!(ids(&results), vec!["a", "b"]);
}

#[tokio::test]
async fn test_async_task_timeout() {
    let retrievers = named(vec![
        ("fast", StaticRetriever::shared("fast", &[("f", 0.9)])),
        ("slow", SlowRetriever::shared("slow", Duration::from_millis(300), &[("s", 0.9)])),
    ]);
    let retriever = AsyncRetriever::new(retrievers).with_task_timeout(Duration::from_millis(50));

    let by_source = retriever
        .search_by_source(&QueryContext::new("q").unwrap())
        .await;

    assert_eq!(by_source.len(), 1);
    assert!(by_source.contains_key("fast"));
}

#[test]
fn test_streaming_bound() {
    let hits: Vec<(String, f32)> = (0..40).map(|i| (format!("d{}", i), 0.5)).collect();
    let hits: Vec<(&str, f32)> = hits.iter().map(|(id, s)| (id.as_str(), *s)).collect();

    let streaming = StreamingRetriever::new(named(vec![
        ("dense", StaticRetriever::shared("dense", &hits)),
        ("sparse", StaticRetriever::shared("sparse", &hits)),
    ]))
    .with_batch_size(4)
    .with_max_total_results(10);

    let context = QueryContext::builder("q").top_k(40).build().unwrap();

    let mut stream = streaming.stream_search(&context);
    let mut batches = Vec::new();
    while let Some(batch) = stream.next_batch() {
        batches.push(batch.len());
    }
    assert_eq!(batches, vec![4, 4, 2]);
    assert_eq!(streaming.search(&context).unwrap().len(), 10);
}

#[test]
fn test_cache_idempotence() {
    let backend = CountingRetriever::new();
    let cached = CachedRetriever::new(backend.clone(), 8, Duration::from_secs(60));
    let context = QueryContext::builder("rust async")
        .top_k(3)
        .filter("lang", "en")
        .build()
        .unwrap();

    let first = cached.search(&context).unwrap();
    let second = cached.search(&context).unwrap();

    assert_eq!(first, second);
    assert_eq!(backend.calls(), 1);
    let info = cached.cache_info();
    assert_eq!(info.hits, 1);
    assert_eq!(info.misses, 1);
}

#[test]
fn test_cache_eviction_drops_oldest_insert() {
    let capacity = 3;
    let backend = CountingRetriever::new();
    let cached = CachedRetriever::new(backend.clone(), capacity, Duration::from_secs(60));

    for i in 0..=capacity {
        cached.search(&QueryContext::new(format!("q{}", i)).unwrap()).unwrap();
    }
    assert_eq!(cached.cache_info().size, capacity);

    // Every key but the first is still cached
    for i in 1..=capacity {
        cached.search(&QueryContext::new(format!("q{}", i)).unwrap()).unwrap();
    }
    assert_eq!(backend.calls(), capacity + 1);

    cached.search(&QueryContext::new("q0").unwrap()).unwrap();
    assert_eq!(backend.calls(), capacity + 2);
}

#[test]
fn test_monitoring_propagates_errors() {
    let monitored = MonitoredRetriever::new(FailingRetriever::shared());

    let outcome = monitored.search(&QueryContext::new("q").unwrap());

    assert!(matches!(outcome, Err(MeldError::Backend { .. })));
    assert_eq!(monitored.report().error_count, 1);
}

#[test]
fn test_wrappers_nest() {
    let backend = CountingRetriever::new();
    let monitored = Arc::new(MonitoredRetriever::new(backend.clone()));
    let cached = CachedRetriever::new(monitored.clone(), 4, Duration::from_secs(60));
    let context = QueryContext::new("nested").unwrap();

    cached.search(&context).unwrap();
    cached.search(&context).unwrap();

    assert_eq!(cached.name(), "cached_monitored_counting");
    assert_eq!(monitored.report().total_searches, 1);
    assert_eq!(backend.calls(), 1);
}
