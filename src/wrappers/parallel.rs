//! Thread-pool fan-out across several retrievers

use crate::config::ParallelConfig;
use crate::error::{MeldError, Result};
use crate::retrieval::{
    NamedRetrievers, QueryContext, Retriever, SearchResult, SharedRetriever, SourceResults,
};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn, Span};

/// Default upper bound on worker threads
pub const DEFAULT_MAX_WORKERS: usize = 4;

/// Default soft timeout for one retriever call
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bound on a whole fan-out
pub const DEFAULT_TOTAL_TIMEOUT: Duration = Duration::from_secs(30);

/// Sizing for one bounded thread-pool fan-out
///
/// Each call to `run` builds a rayon pool of `min(retrievers, max_workers)`
/// threads and spawns one task per retriever. A call that overruns
/// `task_timeout` has its results discarded; once `total_timeout`
/// elapses the collector stops waiting and stragglers are abandoned.
#[derive(Debug, Clone)]
pub struct FanOut {
    max_workers: usize,
    task_timeout: Duration,
    total_timeout: Duration,
}

struct Job {
    index: usize,
    name: String,
    retriever: SharedRetriever,
}

struct Outcome {
    index: usize,
    name: String,
    elapsed: Duration,
    result: Result<Vec<SearchResult>>,
}

impl Job {
    fn execute(self, context: &QueryContext, task_timeout: Duration) -> Outcome {
        let started = Instant::now();
        let result = catch_unwind(AssertUnwindSafe(|| self.retriever.search(context)))
            .unwrap_or_else(|_| Err(MeldError::backend(&self.name, "retriever panicked")));
        let elapsed = started.elapsed();

        let result = match result {
            Ok(_) if elapsed > task_timeout => Err(MeldError::Timeout {
                retriever: self.name.clone(),
                elapsed_ms: elapsed.as_millis() as u64,
            }),
            other => other,
        };

        Outcome {
            index: self.index,
            name: self.name,
            elapsed,
            result,
        }
    }
}

impl FanOut {
    pub fn new(max_workers: usize, task_timeout: Duration, total_timeout: Duration) -> Self {
        Self {
            max_workers: max_workers.max(1),
            task_timeout,
            total_timeout,
        }
    }

    pub fn from_config(config: &ParallelConfig) -> Result<Self> {
        Ok(Self::new(
            config.max_workers,
            config.task_timeout()?,
            config.total_timeout()?,
        ))
    }

    pub fn with_total_timeout(mut self, total_timeout: Duration) -> Self {
        self.total_timeout = total_timeout;
        self
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub fn task_timeout(&self) -> Duration {
        self.task_timeout
    }

    pub fn total_timeout(&self) -> Duration {
        self.total_timeout
    }

    /// Number of threads a fan-out over `retrievers` backends uses
    pub fn worker_count(&self, retrievers: usize) -> usize {
        retrievers.min(self.max_workers)
    }

    /// Query every retriever concurrently and collect per-source results
    ///
    /// Failures, panics and timeouts are logged and leave that source out.
    /// Sources appear in the order they were given.
    pub fn run(
        &self,
        retrievers: &[(String, SharedRetriever)],
        context: &QueryContext,
        span: &Span,
    ) -> SourceResults {
        if retrievers.is_empty() {
            return SourceResults::new();
        }

        let started = Instant::now();
        // A timeout too large to represent means no deadline
        let deadline = started.checked_add(self.total_timeout);
        let total = retrievers.len();

        let jobs = retrievers
            .iter()
            .enumerate()
            .map(|(index, (name, retriever))| Job {
                index,
                name: name.clone(),
                retriever: Arc::clone(retriever),
            });

        let (done_tx, done_rx) = crossbeam_channel::unbounded();
        let context = Arc::new(context.clone());

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.worker_count(total))
            .thread_name(|id| format!("meld-fanout-{}", id))
            .build();

        match pool {
            Ok(pool) => {
                for job in jobs {
                    let done = done_tx.clone();
                    let context = Arc::clone(&context);
                    let span = span.clone();
                    let task_timeout = self.task_timeout;
                    pool.spawn(move || {
                        let outcome = span.in_scope(|| job.execute(&context, task_timeout));
                        // Collector may have given up waiting
                        let _ = done.send(outcome);
                    });
                }
            }
            Err(e) => {
                warn!("Failed to build fan-out pool, searching inline: {}", e);
                for job in jobs {
                    let outcome = span.in_scope(|| job.execute(&context, self.task_timeout));
                    let _ = done_tx.send(outcome);
                }
            }
        }
        drop(done_tx);

        let slots = self.collect(&done_rx, total, deadline);

        let results_by_source: SourceResults = retrievers
            .iter()
            .zip(slots)
            .filter_map(|((name, _), slot)| {
                slot.filter(|results| !results.is_empty())
                    .map(|results| (name.clone(), results))
            })
            .collect();

        info!(
            "Parallel search completed in {:.2?}: {} results from {} retrievers",
            started.elapsed(),
            results_by_source.values().map(Vec::len).sum::<usize>(),
            results_by_source.len()
        );

        results_by_source
    }

    fn collect(
        &self,
        done: &Receiver<Outcome>,
        total: usize,
        deadline: Option<Instant>,
    ) -> Vec<Option<Vec<SearchResult>>> {
        let mut slots: Vec<Option<Vec<SearchResult>>> = vec![None; total];
        let mut answered = 0;

        while answered < total {
            let received = match deadline {
                Some(deadline) => done.recv_deadline(deadline),
                None => done.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };

            match received {
                Ok(outcome) => {
                    answered += 1;
                    match outcome.result {
                        Ok(results) => {
                            debug!(
                                "Parallel search completed for {}: {} results in {:?}",
                                outcome.name,
                                results.len(),
                                outcome.elapsed
                            );
                            slots[outcome.index] = Some(results);
                        }
                        Err(e) => warn!("Parallel search failed for {}: {}", outcome.name, e),
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    warn!(
                        "Parallel search timed out after {:?}: {} of {} retrievers answered",
                        self.total_timeout, answered, total
                    );
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        slots
    }
}

impl Default for FanOut {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_WORKERS,
            DEFAULT_TASK_TIMEOUT,
            DEFAULT_TOTAL_TIMEOUT,
        )
    }
}

/// Parallel execution wrapper for multiple retrievers
///
/// Results from all retrievers are flattened, not fused: ordering across
/// retrievers carries no meaning afterwards.
pub struct ParallelRetriever {
    retrievers: NamedRetrievers,
    fan_out: FanOut,
    span: Span,
}

impl ParallelRetriever {
    pub fn new(retrievers: NamedRetrievers, fan_out: FanOut) -> Self {
        Self {
            retrievers,
            fan_out,
            span: tracing::info_span!("parallel_retriever"),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn fan_out(&self) -> &FanOut {
        &self.fan_out
    }

    /// Per-source results, in registration order
    pub fn search_by_source(&self, context: &QueryContext) -> SourceResults {
        self.fan_out.run(&self.retrievers, context, &self.span)
    }
}

impl Retriever for ParallelRetriever {
    fn search(&self, context: &QueryContext) -> Result<Vec<SearchResult>> {
        Ok(self
            .search_by_source(context)
            .into_values()
            .flatten()
            .collect())
    }

    fn name(&self) -> String {
        format!("parallel_retriever({})", self.retrievers.len())
    }
}
