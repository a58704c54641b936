//! One-call assembly of a complete retrieval stack

use super::{AdaptiveRetriever, EnhancedOptions, EnhancedRetriever};
use crate::config::{Config, ConfigValidator};
use crate::error::Result;
use crate::retrieval::{BackendHandle, HybridRetriever, HybridRetrieverBuilder};
use crate::wrappers::StreamingRetriever;
use std::sync::Arc;

pub use crate::config::PerformanceMode;

/// Every retriever flavour built over one set of backends
pub struct RetrievalSystem {
    /// Cached + monitored hybrid stack
    pub enhanced: Arc<EnhancedRetriever>,
    /// Per-request strategy selection over `enhanced`
    pub adaptive: AdaptiveRetriever,
    /// Unfused streaming over every usable backend
    pub streaming: StreamingRetriever,
    /// The bare hybrid retriever underneath
    pub base: Arc<HybridRetriever>,
    pub mode: PerformanceMode,
}

impl RetrievalSystem {
    /// Wrap an already-built hybrid retriever using a preset
    pub fn build(hybrid: HybridRetriever, mode: PerformanceMode) -> Result<Self> {
        let mut config = Config::default();
        config.apply_profile(mode.as_str())?;
        Self::assemble(hybrid, &config)
    }

    /// Build backends, hybrid retriever and wrappers from configuration
    ///
    /// Backends whose construction failed are passed as `Err` and show up
    /// as unavailable in the status report.
    pub fn from_config<I, S>(config: &Config, backends: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, BackendHandle)>,
        S: Into<String>,
    {
        ConfigValidator::validate(config)?;

        let hybrid = backends
            .into_iter()
            .fold(HybridRetrieverBuilder::from_config(config)?, |builder, (name, handle)| {
                builder.backend(name, handle)
            })
            .build()?;

        Self::assemble(hybrid, config)
    }

    fn assemble(hybrid: HybridRetriever, config: &Config) -> Result<Self> {
        let options = EnhancedOptions::from_config(config)?;
        let enhanced = Arc::new(EnhancedRetriever::new(hybrid, options));
        let base = Arc::clone(enhanced.base());

        let adaptive = AdaptiveRetriever::new(Arc::clone(&enhanced), &config.strategy);
        let streaming = StreamingRetriever::new(base.backends())
            .with_batch_size(config.streaming.batch_size)
            .with_max_total_results(config.streaming.max_total_results);

        tracing::info!(
            "Retrieval system ready in {} mode with {} backends",
            config.performance_mode,
            base.backends().len()
        );

        Ok(Self {
            enhanced,
            adaptive,
            streaming,
            base,
            mode: config.performance_mode,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        let speed = RetrievalSystem::build(HybridRetriever::builder().build().unwrap(), PerformanceMode::Speed)
            .unwrap();
        let options = speed.enhanced.options();
        assert!(options.enable_parallel && options.enable_caching && !options.enable_monitoring);
        assert_eq!(options.cache_capacity, 256);
        assert_eq!(options.parallel_timeout.as_secs(), 15);
        assert_eq!(speed.mode, PerformanceMode::Speed);

        let memory = RetrievalSystem::build(HybridRetriever::builder().build().unwrap(), PerformanceMode::Memory)
            .unwrap();
        let options = memory.enhanced.options();
        assert!(!options.enable_parallel && !options.enable_caching && options.enable_monitoring);
        assert!(!memory.base.is_parallel());
    }
}
