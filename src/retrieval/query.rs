//! Search requests and the vocabulary used to describe them

use crate::error::{MeldError, Result};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Default number of results per request
pub const DEFAULT_TOP_K: usize = 5;

/// Requests asking for more results than this are clamped
pub const MAX_TOP_K: usize = 100;

/// Request filters, kept sorted so they hash deterministically
pub type Filters = BTreeMap<String, Value>;

/// Family of backend a retriever belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SearchType {
    /// Dense vector similarity
    Dense,
    /// Sparse lexical models (TF-IDF, BM25)
    Sparse,
    /// Full-text indexes
    Fulltext,
    /// Graph traversal
    Graph,
}

impl SearchType {
    pub const ALL: [SearchType; 4] = [
        SearchType::Dense,
        SearchType::Sparse,
        SearchType::Fulltext,
        SearchType::Graph,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SearchType::Dense => "dense",
            SearchType::Sparse => "sparse",
            SearchType::Fulltext => "fulltext",
            SearchType::Graph => "graph",
        }
    }

    /// Classify a backend key such as `dense` or `sparse_bm25`
    pub fn of_backend(name: &str) -> Option<SearchType> {
        let family = name.split('_').next().unwrap_or(name);
        family.parse().ok()
    }
}

impl FromStr for SearchType {
    type Err = MeldError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dense" => Ok(SearchType::Dense),
            "sparse" => Ok(SearchType::Sparse),
            "fulltext" => Ok(SearchType::Fulltext),
            "graph" => Ok(SearchType::Graph),
            _ => Err(MeldError::UnknownSearchType(s.to_string())),
        }
    }
}

impl fmt::Display for SearchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rank-fusion algorithm selected for a request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FusionMethod {
    ReciprocalRank,
    WeightedSum,
    BordaCount,
    Adaptive,
    /// Strategy registered by name in a `FusionRegistry`
    Custom(String),
}

impl FusionMethod {
    /// Refer to a strategy registered under `name`
    pub fn custom(name: impl Into<String>) -> Self {
        FusionMethod::Custom(name.into())
    }

    /// Canonical registry name
    pub fn as_str(&self) -> &str {
        match self {
            FusionMethod::ReciprocalRank => "reciprocal_rank",
            FusionMethod::WeightedSum => "weighted_sum",
            FusionMethod::BordaCount => "borda_count",
            FusionMethod::Adaptive => "adaptive",
            FusionMethod::Custom(name) => name,
        }
    }
}

impl FromStr for FusionMethod {
    type Err = MeldError;

    /// Parses built-in names and their short aliases
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reciprocal_rank" | "rrf" => Ok(FusionMethod::ReciprocalRank),
            "weighted_sum" | "weighted" => Ok(FusionMethod::WeightedSum),
            "borda_count" | "borda" => Ok(FusionMethod::BordaCount),
            "adaptive" => Ok(FusionMethod::Adaptive),
            _ => Err(MeldError::UnknownFusionMethod(s.to_string())),
        }
    }
}

impl fmt::Display for FusionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One validated search request
///
/// Constructed once per request and only ever read afterwards. Wrappers
/// that need a different shape (e.g. a wider `top_k` for fan-out) derive
/// a new context instead of touching the caller's.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryContext {
    query: String,
    filters: Option<Filters>,
    top_k: usize,
    search_types: Option<BTreeSet<SearchType>>,
    fusion_method: Option<FusionMethod>,
}

impl QueryContext {
    /// Context with default settings for `query`
    pub fn new(query: impl Into<String>) -> Result<Self> {
        Self::builder(query).build()
    }

    pub fn builder(query: impl Into<String>) -> QueryContextBuilder {
        QueryContextBuilder::new(query)
    }

    /// Trimmed query text
    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn filters(&self) -> Option<&Filters> {
        self.filters.as_ref()
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Backend families to consult; `None` means all of them
    pub fn search_types(&self) -> Option<&BTreeSet<SearchType>> {
        self.search_types.as_ref()
    }

    /// Per-request fusion override; `None` defers to the retriever
    pub fn fusion_method(&self) -> Option<&FusionMethod> {
        self.fusion_method.as_ref()
    }

    /// Whether a backend of the given family should be consulted
    pub fn wants(&self, search_type: SearchType) -> bool {
        self.search_types
            .as_ref()
            .map_or(true, |types| types.contains(&search_type))
    }

    /// Number of whitespace-separated tokens in the query
    pub fn token_count(&self) -> usize {
        self.query.split_whitespace().count()
    }

    /// Lowercased query text for keyword matching
    pub fn normalized_query(&self) -> String {
        self.query.to_lowercase()
    }

    /// Derived context asking for a different number of results
    pub(crate) fn with_top_k(&self, top_k: usize) -> Self {
        Self {
            top_k: top_k.clamp(1, MAX_TOP_K),
            ..self.clone()
        }
    }
}

/// Builder validating a `QueryContext` at construction time
#[derive(Debug, Clone)]
pub struct QueryContextBuilder {
    query: String,
    filters: Option<Filters>,
    top_k: usize,
    search_types: Vec<String>,
    fusion_method: Option<String>,
    custom_fusion: Option<FusionMethod>,
}

impl QueryContextBuilder {
    fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            filters: None,
            top_k: DEFAULT_TOP_K,
            search_types: Vec::new(),
            fusion_method: None,
            custom_fusion: None,
        }
    }

    pub fn top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn filter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters
            .get_or_insert_with(Filters::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn filters(mut self, filters: Filters) -> Self {
        self.filters = Some(filters);
        self
    }

    /// Restrict the request to the named backend families
    pub fn search_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.search_types
            .extend(types.into_iter().map(|t| t.as_ref().to_string()));
        self
    }

    pub fn search_type(mut self, search_type: SearchType) -> Self {
        self.search_types.push(search_type.as_str().to_string());
        self
    }

    /// Select a fusion method by name (aliases accepted)
    pub fn fusion_method(mut self, name: impl Into<String>) -> Self {
        self.fusion_method = Some(name.into());
        self.custom_fusion = None;
        self
    }

    pub fn fusion(mut self, method: FusionMethod) -> Self {
        self.custom_fusion = Some(method);
        self.fusion_method = None;
        self
    }

    pub fn build(self) -> Result<QueryContext> {
        let query = self.query.trim().to_string();
        if query.is_empty() {
            return Err(MeldError::EmptyQuery);
        }

        if self.top_k == 0 {
            return Err(MeldError::InvalidTopK(self.top_k));
        }

        let search_types = if self.search_types.is_empty() {
            None
        } else {
            let types = self
                .search_types
                .iter()
                .map(|t| t.parse::<SearchType>())
                .collect::<Result<BTreeSet<_>>>()?;
            Some(types)
        };

        let fusion_method = match (self.fusion_method, self.custom_fusion) {
            (Some(name), _) => Some(name.parse::<FusionMethod>()?),
            (None, custom) => custom,
        };

        Ok(QueryContext {
            query,
            filters: self.filters.filter(|f| !f.is_empty()),
            top_k: self.top_k.min(MAX_TOP_K),
            search_types,
            fusion_method,
        })
    }
}
