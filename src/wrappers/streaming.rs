//! Lazy, bounded streaming of backend results

use crate::error::Result;
use crate::retrieval::{NamedRetrievers, QueryContext, Retriever, SearchResult, SharedRetriever};
use std::collections::VecDeque;
use std::iter::FusedIterator;
use std::vec;
use tracing::{debug, warn, Span};

/// Default number of results handed out per batch
pub const DEFAULT_BATCH_SIZE: usize = 5;

/// Default ceiling on results produced by one stream
pub const DEFAULT_MAX_TOTAL_RESULTS: usize = 100;

/// Streaming retriever for memory-bounded result processing
pub struct StreamingRetriever {
    retrievers: NamedRetrievers,
    batch_size: usize,
    max_total_results: usize,
    span: Span,
}

impl StreamingRetriever {
    pub fn new(retrievers: NamedRetrievers) -> Self {
        Self {
            retrievers,
            batch_size: DEFAULT_BATCH_SIZE,
            max_total_results: DEFAULT_MAX_TOTAL_RESULTS,
            span: tracing::info_span!("streaming_retriever"),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_max_total_results(mut self, max_total_results: usize) -> Self {
        self.max_total_results = max_total_results;
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn max_total_results(&self) -> usize {
        self.max_total_results
    }

    /// Start a stream over every wrapped retriever
    ///
    /// No backend is queried until the stream is first polled.
    pub fn stream_search(&self, context: &QueryContext) -> ResultStream {
        ResultStream {
            pending: self.retrievers.clone().into_iter(),
            current: None,
            buffer: VecDeque::new(),
            context: context.clone(),
            batch_size: self.batch_size,
            remaining: self.max_total_results,
            span: self.span.clone(),
        }
    }
}

impl Retriever for StreamingRetriever {
    fn search(&self, context: &QueryContext) -> Result<Vec<SearchResult>> {
        Ok(self.stream_search(context).collect())
    }

    fn name(&self) -> String {
        format!("streaming_retriever({})", self.retrievers.len())
    }
}

/// Finite, single-pass stream of results
///
/// Backends are queried one at a time and their results handed out in
/// batches of `batch_size`. The stream ends once `max_total_results`
/// items have been produced or every backend is exhausted.
pub struct ResultStream {
    pending: vec::IntoIter<(String, SharedRetriever)>,
    current: Option<(String, vec::IntoIter<SearchResult>)>,
    buffer: VecDeque<SearchResult>,
    context: QueryContext,
    batch_size: usize,
    remaining: usize,
    span: Span,
}

impl ResultStream {
    /// Next batch of at most `batch_size` results
    pub fn next_batch(&mut self) -> Option<Vec<SearchResult>> {
        if !self.buffer.is_empty() {
            let take = self.buffer.len().min(self.batch_size);
            return Some(self.buffer.drain(..take).collect());
        }
        self.fetch_batch()
    }

    /// Results still allowed before the ceiling is hit
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    fn fetch_batch(&mut self) -> Option<Vec<SearchResult>> {
        let _entered = self.span.enter();

        while self.remaining > 0 {
            if let Some((name, results)) = &mut self.current {
                let take = self.batch_size.min(self.remaining);
                let batch: Vec<SearchResult> = results.by_ref().take(take).collect();
                if !batch.is_empty() {
                    self.remaining -= batch.len();
                    debug!("Streaming batch of {} results from {}", batch.len(), name);
                    return Some(batch);
                }
                self.current = None;
            }

            let (name, retriever) = self.pending.next()?;
            match retriever.search(&self.context) {
                Ok(results) => self.current = Some((name, results.into_iter())),
                Err(e) => warn!("Streaming search failed for {}: {}", name, e),
            }
        }

        None
    }
}

impl Iterator for ResultStream {
    type Item = SearchResult;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() {
            let batch = self.fetch_batch()?;
            self.buffer.extend(batch);
        }
        self.buffer.pop_front()
    }
}

impl FusedIterator for ResultStream {}
