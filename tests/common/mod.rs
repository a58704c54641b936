//! In-memory backends shared by the integration tests
#![allow(dead_code)]

use meld::retrieval::{Metadata, QueryContext, Retriever, SearchResult, SharedRetriever};
use meld::{MeldError, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub fn hit(id: &str, score: f32, source: &str) -> SearchResult {
    let mut metadata = Metadata::new();
    metadata.insert("origin".to_string(), source.into());
    SearchResult::new(id, format!("content of {}", id), score, source, metadata)
}

pub fn ids(results: &[SearchResult]) -> Vec<&str> {
    results.iter().map(|r| r.id()).collect()
}

/// Returns a fixed list, truncated to the requested `top_k`
pub struct StaticRetriever {
    name: String,
    results: Vec<SearchResult>,
}

impl StaticRetriever {
    pub fn shared(name: &str, hits: &[(&str, f32)]) -> SharedRetriever {
        Arc::new(Self {
            name: name.to_string(),
            results: hits.iter().map(|(id, score)| hit(id, *score, name)).collect(),
        })
    }
}

impl Retriever for StaticRetriever {
    fn search(&self, context: &QueryContext) -> Result<Vec<SearchResult>> {
        Ok(self.results.iter().take(context.top_k()).cloned().collect())
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}

/// Always fails
pub struct FailingRetriever;

impl FailingRetriever {
    pub fn shared() -> SharedRetriever {
        Arc::new(Self)
    }
}

impl Retriever for FailingRetriever {
    fn search(&self, _context: &QueryContext) -> Result<Vec<SearchResult>> {
        Err(MeldError::backend("failing", "connection refused"))
    }

    fn name(&self) -> String {
        "failing".to_string()
    }
}

/// Counts invocations, returns one result per call
#[derive(Default)]
pub struct CountingRetriever {
    calls: AtomicUsize,
}

impl CountingRetriever {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Retriever for CountingRetriever {
    fn search(&self, context: &QueryContext) -> Result<Vec<SearchResult>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![hit(context.query(), 0.8, "counting")])
    }

    fn name(&self) -> String {
        "counting".to_string()
    }
}

/// Sleeps before answering
pub struct SlowRetriever {
    delay: Duration,
    results: Vec<SearchResult>,
}

impl SlowRetriever {
    pub fn shared(name: &str, delay: Duration, hits: &[(&str, f32)]) -> SharedRetriever {
        Arc::new(Self {
            delay,
            results: hits.iter().map(|(id, score)| hit(id, *score, name)).collect(),
        })
    }
}

impl Retriever for SlowRetriever {
    fn search(&self, _context: &QueryContext) -> Result<Vec<SearchResult>> {
        std::thread::sleep(self.delay);
        Ok(self.results.clone())
    }

    fn name(&self) -> String {
        "slow".to_string()
    }
}
