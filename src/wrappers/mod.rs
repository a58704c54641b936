//! Retriever wrappers
//!
//! Every wrapper is itself a `Retriever`, so they nest freely. Wrapping
//! changes how a search executes, never what it means.

mod async_fanout;
mod cached;
mod monitored;
mod parallel;
mod streaming;

pub use async_fanout::AsyncRetriever;
pub use cached::{CacheInfo, CachedRetriever, DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL};
pub use monitored::{MonitoredRetriever, PerformanceReport};
pub use parallel::{
    FanOut, ParallelRetriever, DEFAULT_MAX_WORKERS, DEFAULT_TASK_TIMEOUT, DEFAULT_TOTAL_TIMEOUT,
};
pub use streaming::{
    ResultStream, StreamingRetriever, DEFAULT_BATCH_SIZE, DEFAULT_MAX_TOTAL_RESULTS,
};
