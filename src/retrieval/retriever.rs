//! The retrieval capability shared by backends and wrappers

use crate::error::{BackendUnavailable, Result};
use crate::retrieval::{QueryContext, SearchResult};
use serde::Serialize;
use std::sync::Arc;

/// Anything that can answer a `QueryContext` with ranked results
///
/// Backends, the hybrid retriever, and every wrapper implement this one
/// trait, which is what lets wrappers nest in any order.
pub trait Retriever: Send + Sync {
    /// Execute search and return results, best first
    fn search(&self, context: &QueryContext) -> Result<Vec<SearchResult>>;

    /// Retriever name for identification
    fn name(&self) -> String;
}

/// Shared handle to a retriever
pub type SharedRetriever = Arc<dyn Retriever>;

/// Outcome of constructing a backend
pub type BackendHandle = std::result::Result<SharedRetriever, BackendUnavailable>;

/// Named retrievers in registration order
pub type NamedRetrievers = Vec<(String, SharedRetriever)>;

/// Startup status of a registered backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "lowercase")]
pub enum BackendStatus {
    /// Constructed and consulted on search
    Ready,
    /// Construction failed; never consulted
    Unavailable(String),
    /// Its search type is switched off in configuration
    Disabled,
}

impl BackendStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, BackendStatus::Ready)
    }
}
