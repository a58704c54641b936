//! Hybrid search combining dense, sparse, full-text and graph backends

use crate::config::{Config, FusionConfig, HybridConfig};
use crate::error::{MeldError, Result};
use crate::retrieval::fusion::{Fusion, FusionRegistry, SourceResults};
use crate::retrieval::{
    BackendHandle, BackendStatus, FusionMethod, NamedRetrievers, QueryContext, Retriever,
    SearchResult, SearchType, SharedRetriever,
};
use crate::wrappers::FanOut;
use indexmap::IndexMap;
use std::sync::Arc;
use tracing::Span;

/// Multi-modal hybrid retriever
///
/// Owns a named set of backend retrievers, consults the ones relevant to
/// each request, and fuses their ranked lists. A failing backend is
/// logged and contributes nothing; the request itself never fails
/// because of it.
pub struct HybridRetriever {
    backends: IndexMap<String, SharedRetriever>,
    status: IndexMap<String, BackendStatus>,
    registry: FusionRegistry,
    default_method: FusionMethod,
    config: HybridConfig,
    fan_out: Option<FanOut>,
    span: Span,
}

impl HybridRetriever {
    pub fn builder() -> HybridRetrieverBuilder {
        HybridRetrieverBuilder::default()
    }

    /// Backends ready to be consulted for `context`, in registration order
    pub fn select_backends(&self, context: &QueryContext) -> NamedRetrievers {
        self.backends
            .iter()
            .filter(|(name, _)| match context.search_types() {
                None => true,
                Some(_) => SearchType::of_backend(name).is_some_and(|t| context.wants(t)),
            })
            .map(|(name, retriever)| (name.clone(), Arc::clone(retriever)))
            .collect()
    }

    /// Every usable backend, in registration order
    pub fn backends(&self) -> NamedRetrievers {
        self.backends
            .iter()
            .map(|(name, retriever)| (name.clone(), Arc::clone(retriever)))
            .collect()
    }

    /// Startup status of every registered backend
    pub fn retriever_status(&self) -> &IndexMap<String, BackendStatus> {
        &self.status
    }

    /// Fusion method used when a request does not name one
    pub fn default_fusion_method(&self) -> &FusionMethod {
        &self.default_method
    }

    pub fn fusion_registry(&self) -> &FusionRegistry {
        &self.registry
    }

    pub fn is_parallel(&self) -> bool {
        self.fan_out.is_some()
    }

    /// Switch between sequential and thread-pool fan-out
    pub fn with_fan_out(mut self, fan_out: Option<FanOut>) -> Self {
        self.fan_out = fan_out;
        self
    }

    /// How many candidates to ask each backend for
    fn candidate_count(&self, top_k: usize) -> usize {
        top_k
            .saturating_mul(self.config.candidate_multiplier)
            .min(self.config.candidate_cap)
            .max(top_k)
    }

    fn strategy_for(&self, context: &QueryContext) -> Result<Arc<dyn Fusion>> {
        let method = context.fusion_method().unwrap_or(&self.default_method);
        self.registry
            .get(method)
            .ok_or_else(|| MeldError::UnknownFusionMethod(method.to_string()))
    }

    fn search_sequential(
        &self,
        backends: &[(String, SharedRetriever)],
        context: &QueryContext,
    ) -> SourceResults {
        let mut results_by_source = SourceResults::new();

        for (name, retriever) in backends {
            match retriever.search(context) {
                Ok(results) if !results.is_empty() => {
                    tracing::debug!("{} returned {} results", name, results.len());
                    results_by_source.insert(name.clone(), results);
                }
                Ok(_) => tracing::debug!("{} returned no results", name),
                Err(e) => tracing::warn!("Search failed for {}: {}", name, e),
            }
        }

        results_by_source
    }
}

impl Retriever for HybridRetriever {
    fn search(&self, context: &QueryContext) -> Result<Vec<SearchResult>> {
        let _entered = self.span.enter();

        // Step 1: Resolve the fusion strategy (unknown names fail fast)
        let strategy = self.strategy_for(context)?;

        // Step 2: Pick the backends this request asks for
        let selected = self.select_backends(context);
        if selected.is_empty() {
            tracing::debug!("No backends selected for query");
            return Ok(Vec::new());
        }

        // Step 3: Widen top_k so fusion has candidates to re-rank
        let candidate_context = context.with_top_k(self.candidate_count(context.top_k()));

        // Step 4: Fan out
        let results_by_source = match &self.fan_out {
            Some(fan_out) => fan_out.run(&selected, &candidate_context, &self.span),
            None => self.search_sequential(&selected, &candidate_context),
        };

        if results_by_source.is_empty() {
            tracing::info!("All {} backends returned nothing", selected.len());
            return Ok(Vec::new());
        }

        // Step 5: Fuse
        Ok(strategy.fuse(&results_by_source, context))
    }

    fn name(&self) -> String {
        "hybrid_multi_modal".to_string()
    }
}

/// Builder registering backends and fusion settings for a `HybridRetriever`
pub struct HybridRetrieverBuilder {
    hybrid: HybridConfig,
    fusion: FusionConfig,
    backends: Vec<(String, BackendHandle)>,
    strategies: Vec<(String, Arc<dyn Fusion>)>,
    fan_out: Option<FanOut>,
    span: Option<Span>,
}

impl Default for HybridRetrieverBuilder {
    fn default() -> Self {
        Self {
            hybrid: HybridConfig::default(),
            fusion: FusionConfig::default(),
            backends: Vec::new(),
            strategies: Vec::new(),
            fan_out: None,
            span: None,
        }
    }
}

impl HybridRetrieverBuilder {
    /// Builder seeded from the hybrid, fusion and parallel sections
    pub fn from_config(config: &Config) -> Result<Self> {
        let fan_out = if config.parallel.enabled {
            Some(FanOut::from_config(&config.parallel)?)
        } else {
            None
        };

        Ok(Self {
            hybrid: config.hybrid.clone(),
            fusion: config.fusion.clone(),
            fan_out,
            ..Self::default()
        })
    }

    pub fn hybrid_config(mut self, config: HybridConfig) -> Self {
        self.hybrid = config;
        self
    }

    pub fn fusion_config(mut self, config: FusionConfig) -> Self {
        self.fusion = config;
        self
    }

    /// Register the outcome of constructing a backend
    ///
    /// An `Err` is kept as an `Unavailable` status entry and the backend
    /// is never consulted.
    pub fn backend(mut self, name: impl Into<String>, handle: BackendHandle) -> Self {
        self.backends.push((name.into(), handle));
        self
    }

    /// Register a backend that is known to be usable
    pub fn retriever(self, name: impl Into<String>, retriever: SharedRetriever) -> Self {
        self.backend(name, Ok(retriever))
    }

    /// Make a custom fusion strategy selectable by name
    pub fn fusion_strategy(mut self, name: impl Into<String>, strategy: Arc<dyn Fusion>) -> Self {
        self.strategies.push((name.into(), strategy));
        self
    }

    /// Fan backends out over a thread pool instead of sequentially
    pub fn parallel(mut self, fan_out: FanOut) -> Self {
        self.fan_out = Some(fan_out);
        self
    }

    pub fn span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    fn enabled(&self, name: &str) -> bool {
        match SearchType::of_backend(name) {
            Some(SearchType::Dense) => self.hybrid.enable_dense,
            Some(SearchType::Sparse) => self.hybrid.enable_sparse,
            Some(SearchType::Fulltext) => self.hybrid.enable_fulltext,
            Some(SearchType::Graph) => self.hybrid.enable_graph,
            None => true,
        }
    }

    pub fn build(self) -> Result<HybridRetriever> {
        let default_method: FusionMethod = self.fusion.method.parse()?;

        let mut registry = FusionRegistry::new(&self.fusion)?;
        for (name, strategy) in &self.strategies {
            registry.register(name.clone(), Arc::clone(strategy));
        }

        let mut backends = IndexMap::new();
        let mut status = IndexMap::new();

        for (name, handle) in &self.backends {
            if !self.enabled(name) {
                tracing::info!("Backend {} disabled by configuration", name);
                status.insert(name.clone(), BackendStatus::Disabled);
                continue;
            }

            match handle {
                Ok(retriever) => {
                    backends.insert(name.clone(), Arc::clone(retriever));
                    status.insert(name.clone(), BackendStatus::Ready);
                }
                Err(unavailable) => {
                    tracing::warn!("Failed to initialize {} retriever: {}", name, unavailable.reason);
                    backends.shift_remove(name);
                    status.insert(
                        name.clone(),
                        BackendStatus::Unavailable(unavailable.reason.clone()),
                    );
                }
            }
        }

        tracing::info!(
            "Hybrid retriever ready: {} of {} backends usable, fusion={}",
            backends.len(),
            status.len(),
            default_method
        );

        Ok(HybridRetriever {
            backends,
            status,
            registry,
            default_method,
            config: self.hybrid,
            fan_out: self.fan_out,
            span: self
                .span
                .unwrap_or_else(|| tracing::info_span!("hybrid_retriever")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendUnavailable;
    use crate::retrieval::Metadata;

    struct Fixed(Vec<(&'static str, f32)>);

    impl Retriever for Fixed {
        fn search(&self, context: &QueryContext) -> Result<Vec<SearchResult>> {
            Ok(self
                .0
                .iter()
                .take(context.top_k())
                .map(|(id, score)| SearchResult::new(*id, *id, *score, "fixed", Metadata::new()))
                .collect())
        }

        fn name(&self) -> String {
            "fixed".to_string()
        }
    }

    fn fixed(hits: Vec<(&'static str, f32)>) -> SharedRetriever {
        Arc::new(Fixed(hits))
    }

    #[test]
    fn test_candidate_count() {
        let hybrid = HybridRetriever::builder().build().unwrap();
        assert_eq!(hybrid.candidate_count(3), 6);
        assert_eq!(hybrid.candidate_count(15), 20);
        assert_eq!(hybrid.candidate_count(40), 40);
    }

    #[test]
    fn test_status_map() {
        let hybrid = HybridRetriever::builder()
            .hybrid_config(HybridConfig {
                enable_graph: false,
                ..HybridConfig::default()
            })
            .retriever("dense", fixed(vec![("a", 0.5)]))
            .backend(
                "sparse_bm25",
                Err(BackendUnavailable::new("sparse_bm25", "index missing")),
            )
            .retriever("graph_neo4j", fixed(vec![("b", 0.5)]))
            .build()
            .unwrap();

        let status = hybrid.retriever_status();
        assert_eq!(status["dense"], BackendStatus::Ready);
        assert_eq!(
            status["sparse_bm25"],
            BackendStatus::Unavailable("index missing".to_string())
        );
        assert_eq!(status["graph_neo4j"], BackendStatus::Disabled);

        let context = QueryContext::new("anything").unwrap();
        let selected: Vec<String> = hybrid
            .select_backends(&context)
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(selected, vec!["dense"]);
    }

    #[test]
    fn test_search_type_selection() {
        let hybrid = HybridRetriever::builder()
            .retriever("dense", fixed(vec![("a", 0.9)]))
            .retriever("sparse_tfidf", fixed(vec![("b", 0.9)]))
            .retriever("sparse_bm25", fixed(vec![("c", 0.9)]))
            .retriever("graph_path", fixed(vec![("d", 0.9)]))
            .build()
            .unwrap();

        let context = QueryContext::builder("q")
            .search_types(["sparse"])
            .build()
            .unwrap();
        let names: Vec<String> = hybrid
            .select_backends(&context)
            .into_iter()
            .map(|(name, _)| name)
            .collect();

        assert_eq!(names, vec!["sparse_tfidf", "sparse_bm25"]);
    }

    #[test]
    fn test_unknown_custom_fusion_fails_fast() {
        let hybrid = HybridRetriever::builder()
            .retriever("dense", fixed(vec![("a", 0.9)]))
            .build()
            .unwrap();
        let context = QueryContext::builder("q")
            .fusion(FusionMethod::custom("nope"))
            .build()
            .unwrap();

        assert!(matches!(
            hybrid.search(&context),
            Err(MeldError::UnknownFusionMethod(name)) if name == "nope"
        ));
    }

    #[test]
    fn test_invalid_fusion_config() {
        let result = HybridRetriever::builder()
            .fusion_config(FusionConfig {
                method: "median".to_string(),
                ..FusionConfig::default()
            })
            .build();
        assert!(result.is_err());
    }
}
