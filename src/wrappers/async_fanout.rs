//! Fan-out over the tokio blocking pool

use crate::error::{MeldError, Result};
use crate::retrieval::{NamedRetrievers, QueryContext, Retriever, SearchResult, SourceResults};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument, Span};

/// Async execution wrapper for retrievers
///
/// Backends are blocking, so each one runs on tokio's blocking pool; a
/// semaphore bounds how many run at once. A failing, panicking or
/// timed-out backend contributes nothing and never aborts its siblings.
pub struct AsyncRetriever {
    retrievers: NamedRetrievers,
    max_concurrent: usize,
    task_timeout: Duration,
    span: Span,
}

impl AsyncRetriever {
    pub fn new(retrievers: NamedRetrievers) -> Self {
        Self {
            retrievers,
            max_concurrent: super::DEFAULT_MAX_WORKERS,
            task_timeout: super::DEFAULT_TASK_TIMEOUT,
            span: tracing::info_span!("async_retriever"),
        }
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    pub fn with_task_timeout(mut self, task_timeout: Duration) -> Self {
        self.task_timeout = task_timeout;
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Per-source results, in registration order
    pub async fn search_by_source(&self, context: &QueryContext) -> SourceResults {
        let started = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let context = Arc::new(context.clone());

        let handles: Vec<(String, JoinHandle<Result<Vec<SearchResult>>>)> = self
            .retrievers
            .iter()
            .map(|(name, retriever)| {
                let semaphore = Arc::clone(&semaphore);
                let retriever = Arc::clone(retriever);
                let context = Arc::clone(&context);
                let task_name = name.clone();
                let task_timeout = self.task_timeout;

                let task = async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|e| MeldError::Runtime(e.to_string()))?;

                    let call_started = Instant::now();
                    let blocking = tokio::task::spawn_blocking(move || retriever.search(&context));

                    match tokio::time::timeout(task_timeout, blocking).await {
                        Ok(Ok(result)) => result,
                        Ok(Err(join_error)) => {
                            Err(MeldError::backend(&task_name, join_error.to_string()))
                        }
                        Err(_) => Err(MeldError::Timeout {
                            retriever: task_name.clone(),
                            elapsed_ms: call_started.elapsed().as_millis() as u64,
                        }),
                    }
                };

                (name.clone(), tokio::spawn(task.instrument(self.span.clone())))
            })
            .collect();

        // Gather every outcome; no failure short-circuits the rest
        let mut results_by_source = SourceResults::new();
        for (name, handle) in handles {
            match handle.await {
                Ok(Ok(results)) if !results.is_empty() => {
                    debug!("Async search completed for {}: {} results", name, results.len());
                    results_by_source.insert(name, results);
                }
                Ok(Ok(_)) => debug!("{} returned no results", name),
                Ok(Err(e)) => warn!("Async search failed for {}: {}", name, e),
                Err(e) => warn!("Async task for {} did not complete: {}", name, e),
            }
        }

        info!(
            "Async search completed in {:.2?}: {} results from {} retrievers",
            started.elapsed(),
            results_by_source.values().map(Vec::len).sum::<usize>(),
            results_by_source.len()
        );

        results_by_source
    }

    /// Flattened results from every retriever
    pub async fn search_async(&self, context: &QueryContext) -> Result<Vec<SearchResult>> {
        Ok(self
            .search_by_source(context)
            .await
            .into_values()
            .flatten()
            .collect())
    }

    fn block_on_search(&self, context: &QueryContext) -> Result<Vec<SearchResult>> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(|e| MeldError::Runtime(format!("Failed to create tokio runtime: {}", e)))?;

        let results = runtime.block_on(self.search_async(context));
        // Abandoned blocking calls must not hold up the caller
        runtime.shutdown_background();
        results
    }
}

impl Retriever for AsyncRetriever {
    /// Blocking entry point
    ///
    /// Starts a private runtime; when already called from inside a tokio
    /// runtime the private one runs on a scoped helper thread, since
    /// runtimes cannot be nested on one thread.
    fn search(&self, context: &QueryContext) -> Result<Vec<SearchResult>> {
        if tokio::runtime::Handle::try_current().is_err() {
            return self.block_on_search(context);
        }

        thread::scope(|scope| {
            thread::Builder::new()
                .name("meld-async-search".to_string())
                .spawn_scoped(scope, || self.block_on_search(context))
                .map_err(|e| MeldError::Runtime(format!("Failed to spawn search thread: {}", e)))?
                .join()
                .map_err(|_| MeldError::Runtime("Async search thread panicked".to_string()))?
        })
    }

    fn name(&self) -> String {
        format!("async_retriever({})", self.retrievers.len())
    }
}
