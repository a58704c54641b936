use crate::config::{parse_duration, Config, SCHEMA_VERSION};
use crate::error::{MeldError, Result, ValidationError};
use crate::retrieval::FusionMethod;

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        // Validate schema version
        Self::validate_schema_version(config, &mut errors);

        // Validate backend selection
        Self::validate_hybrid(config, &mut errors);

        // Validate fusion settings
        Self::validate_fusion(config, &mut errors);

        // Validate concurrency settings
        Self::validate_parallel(config, &mut errors);

        // Validate cache and streaming sizing
        Self::validate_sizing(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(MeldError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != SCHEMA_VERSION {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_hybrid(config: &Config, errors: &mut Vec<ValidationError>) {
        let hybrid = &config.hybrid;
        if !(hybrid.enable_dense
            || hybrid.enable_sparse
            || hybrid.enable_fulltext
            || hybrid.enable_graph)
        {
            errors.push(ValidationError::new(
                "hybrid",
                "At least one search type must be enabled",
            ));
        }

        if hybrid.candidate_multiplier == 0 {
            errors.push(ValidationError::new(
                "hybrid.candidate_multiplier",
                "Candidate multiplier must be greater than 0",
            ));
        }

        if hybrid.candidate_cap == 0 {
            errors.push(ValidationError::new(
                "hybrid.candidate_cap",
                "Candidate cap must be greater than 0",
            ));
        }
    }

    fn validate_fusion(config: &Config, errors: &mut Vec<ValidationError>) {
        let fusion = &config.fusion;

        if let Err(e) = fusion.method.parse::<FusionMethod>() {
            errors.push(ValidationError::new("fusion.method", e.to_string()));
        }

        if !(fusion.rrf_k.is_finite() && fusion.rrf_k > 0.0) {
            errors.push(ValidationError::new(
                "fusion.rrf_k",
                format!("rrf_k must be positive, got {}", fusion.rrf_k),
            ));
        }

        for (source, weight) in &fusion.source_weights {
            if !(weight.is_finite() && *weight >= 0.0) {
                errors.push(ValidationError::new(
                    format!("fusion.source_weights.{}", source),
                    format!("Weight must be non-negative, got {}", weight),
                ));
            }
        }
    }

    fn validate_parallel(config: &Config, errors: &mut Vec<ValidationError>) {
        let parallel = &config.parallel;

        if parallel.max_workers == 0 {
            errors.push(ValidationError::new(
                "parallel.max_workers",
                "Worker count must be greater than 0",
            ));
        }

        let task = parse_duration(&parallel.task_timeout);
        let total = parse_duration(&parallel.total_timeout);

        if let Err(message) = &task {
            errors.push(ValidationError::new("parallel.task_timeout", message.clone()));
        }
        if let Err(message) = &total {
            errors.push(ValidationError::new(
                "parallel.total_timeout",
                message.clone(),
            ));
        }

        if let (Ok(task), Ok(total)) = (task, total) {
            if task.is_zero() || total.is_zero() {
                errors.push(ValidationError::new(
                    "parallel",
                    "Timeouts must be greater than 0",
                ));
            } else if total < task {
                errors.push(ValidationError::new(
                    "parallel.total_timeout",
                    format!(
                        "Total timeout ({}) is shorter than the task timeout ({})",
                        parallel.total_timeout, parallel.task_timeout
                    ),
                ));
            }
        }
    }

    fn validate_sizing(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.cache.enabled && config.cache.capacity == 0 {
            errors.push(ValidationError::new(
                "cache.capacity",
                "Cache capacity must be greater than 0 when caching is enabled",
            ));
        }

        if config.streaming.batch_size == 0 {
            errors.push(ValidationError::new(
                "streaming.batch_size",
                "Batch size must be greater than 0",
            ));
        }

        if config.streaming.max_total_results == 0 {
            errors.push(ValidationError::new(
                "streaming.max_total_results",
                "Result ceiling must be greater than 0",
            ));
        }

        if config.strategy.streaming_batch_size == 0 {
            errors.push(ValidationError::new(
                "strategy.streaming_batch_size",
                "Batch size must be greater than 0",
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn error_paths(config: &Config) -> Vec<String> {
        match ConfigValidator::validate(config) {
            Err(MeldError::ConfigValidation { errors }) => {
                errors.into_iter().map(|e| e.path).collect()
            }
            other => panic!("expected validation errors, got {:?}", other),
        }
    }

    #[test]
    fn test_valid_config() {
        let config = Config::default();
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_invalid_fusion_method() {
        let mut config = Config::default();
        config.fusion.method = "median".to_string();
        assert_eq!(error_paths(&config), vec!["fusion.method"]);
    }

    #[test]
    fn test_errors_accumulate() {
        let mut config = Config::default();
        config.fusion.rrf_k = 0.0;
        config.parallel.max_workers = 0;
        config.cache.capacity = 0;

        let paths = error_paths(&config);
        assert_eq!(paths.len(), 3);
        assert!(paths.contains(&"fusion.rrf_k".to_string()));
        assert!(paths.contains(&"parallel.max_workers".to_string()));
        assert!(paths.contains(&"cache.capacity".to_string()));
    }

    #[test]
    fn test_no_search_type_enabled() {
        let mut config = Config::default();
        config.hybrid.enable_dense = false;
        config.hybrid.enable_sparse = false;
        config.hybrid.enable_fulltext = false;
        config.hybrid.enable_graph = false;
        assert_eq!(error_paths(&config), vec!["hybrid"]);
    }

    #[test]
    fn test_timeout_ordering() {
        let mut config = Config::default();
        config.parallel.task_timeout = "10s".to_string();
        config.parallel.total_timeout = "2s".to_string();
        assert_eq!(error_paths(&config), vec!["parallel.total_timeout"]);
    }

    #[test]
    fn test_negative_weight() {
        let mut config = Config::default();
        config.fusion.source_weights.insert("graph".to_string(), -1.0);
        assert_eq!(error_paths(&config), vec!["fusion.source_weights.graph"]);
    }
}
