use crate::config::{parse_duration, Config};
use crate::error::{RaglineError, Result, ValidationError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, collecting every problem before failing
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_llm(config, &mut errors);
        Self::validate_vector_store(config, &mut errors);
        Self::validate_retrieval(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(RaglineError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != "1.0.0" {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        let mode = &config.embedding.mode;
        if mode != "offline" && mode != "online" {
            errors.push(ValidationError::new(
                "embedding.mode",
                format!("Mode must be 'offline' or 'online', got '{}'", mode),
            ));
        }

        if config.embedding.model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
        }

        if mode == "online" && config.embedding.base_url.is_empty() {
            errors.push(ValidationError::new(
                "embedding.base_url",
                "Base URL is required in online mode",
            ));
        }

        if config.embedding.dimensions == Some(0) {
            errors.push(ValidationError::new(
                "embedding.dimensions",
                "Dimensions must be greater than 0",
            ));
        }
    }

    fn validate_llm(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.llm.base_url.is_empty() {
            errors.push(ValidationError::new("llm.base_url", "Base URL cannot be empty"));
        }

        if config.llm.model.is_empty() {
            errors.push(ValidationError::new("llm.model", "Model name cannot be empty"));
        }

        let temp = config.llm.temperature;
        if !(0.0..=2.0).contains(&temp) {
            errors.push(ValidationError::new(
                "llm.temperature",
                format!("Temperature must be between 0.0 and 2.0, got {}", temp),
            ));
        }
    }

    fn validate_vector_store(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.vector_store.url.is_empty() {
            errors.push(ValidationError::new(
                "vector_store.url",
                "URL cannot be empty",
            ));
        }

        if config.vector_store.collection.is_empty() {
            errors.push(ValidationError::new(
                "vector_store.collection",
                "Collection name cannot be empty",
            ));
        }
    }

    fn validate_retrieval(config: &Config, errors: &mut Vec<ValidationError>) {
        let retrieval = &config.retrieval;

        let positive = [
            ("retrieval.search_top_k", retrieval.search_top_k),
            ("retrieval.context_top_k", retrieval.context_top_k),
            ("retrieval.rewrite_query_count", retrieval.rewrite_query_count),
            ("retrieval.heading_max_tokens", retrieval.heading_max_tokens),
        ];
        for (path, value) in positive {
            if value == 0 {
                errors.push(ValidationError::new(path, "Value must be greater than 0"));
            }
        }

        if retrieval.rewrite_cache_capacity == 0 {
            errors.push(ValidationError::new(
                "retrieval.rewrite_cache_capacity",
                "Cache capacity must be greater than 0",
            ));
        }

        match parse_duration(&retrieval.call_timeout) {
            Some(d) if d.is_zero() => errors.push(ValidationError::new(
                "retrieval.call_timeout",
                "Timeout must be greater than 0",
            )),
            Some(_) => {}
            None => errors.push(ValidationError::new(
                "retrieval.call_timeout",
                format!("Invalid duration format: {}", retrieval.call_timeout),
            )),
        }

        if parse_duration(&retrieval.retry_backoff).is_none() {
            errors.push(ValidationError::new(
                "retrieval.retry_backoff",
                format!("Invalid duration format: {}", retrieval.retry_backoff),
            ));
        }
    }
}
