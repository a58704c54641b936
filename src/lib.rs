//! Meld - Multi-Modal Retrieval Fusion
//!
//! Queries several independent search backends (dense vectors, sparse
//! lexical scoring, full-text indexes, graph traversal), fuses their ranked
//! lists into one, and layers parallel fan-out, streaming, caching and
//! performance monitoring around that core through composable wrappers.

pub mod config;
pub mod enhanced;
pub mod error;
pub mod retrieval;
pub mod telemetry;
pub mod wrappers;

pub use error::{MeldError, Result};
