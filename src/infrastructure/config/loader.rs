use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::Config;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "Invalid stack name: {0}. Must be 1-20 lowercase alphanumeric/hyphen characters starting with a letter"
    )]
    InvalidStackName(String),

    #[error("Invalid expiry_days: {0}. Must be at least 1")]
    InvalidExpiryDays(u32),

    #[error("Invalid max_results: {0}. Must be between 1 and 10")]
    InvalidMaxResults(i32),

    #[error("Invalid temperature: {0}. Must be between 0.0 and 1.0")]
    InvalidTemperature(f32),

    #[error("Invalid message_ttl_secs: {0}. Must be positive")]
    InvalidMessageTtl(i64),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid max_retries: {0}. Cannot be 0")]
    InvalidMaxRetries(u32),

    #[error(
        "Invalid backoff configuration: initial_backoff_ms ({0}) must be less than max_backoff_ms ({1})"
    )]
    InvalidBackoff(u64, u64),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .ragstack/config.yaml (project config)
    /// 3. .ragstack/local.yaml (local overrides, optional)
    /// 4. Environment variables (RAGSTACK_* prefix, highest priority)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".ragstack/config.yaml"))
            .merge(Yaml::file(".ragstack/local.yaml"))
            .merge(Env::prefixed("RAGSTACK_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("RAGSTACK_").split("__"))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let name = &config.stack.name;
        let valid_name = !name.is_empty()
            && name.len() <= 20
            && name.starts_with(|c: char| c.is_ascii_lowercase())
            && name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        if !valid_name {
            return Err(ConfigError::InvalidStackName(name.clone()));
        }

        if config.bucket.expiry_days == 0 {
            return Err(ConfigError::InvalidExpiryDays(config.bucket.expiry_days));
        }

        if !config.bucket.document_prefix.ends_with('/') {
            return Err(ConfigError::ValidationFailed(format!(
                "document_prefix '{}' must end with '/'",
                config.bucket.document_prefix
            )));
        }

        if !(1..=10).contains(&config.retrieval.max_results) {
            return Err(ConfigError::InvalidMaxResults(config.retrieval.max_results));
        }

        if !(0.0..=1.0).contains(&config.models.temperature) {
            return Err(ConfigError::InvalidTemperature(config.models.temperature));
        }

        if config.conversations.message_ttl_secs <= 0 {
            return Err(ConfigError::InvalidMessageTtl(
                config.conversations.message_ttl_secs,
            ));
        }

        for (label, function) in [
            ("ingestion", &config.functions.ingestion),
            ("retrieval", &config.functions.retrieval),
        ] {
            if !(1..=900).contains(&function.timeout_secs) {
                return Err(ConfigError::ValidationFailed(format!(
                    "{label} function timeout_secs must be between 1 and 900, got {}",
                    function.timeout_secs
                )));
            }
            if function.handler.is_empty() {
                return Err(ConfigError::ValidationFailed(format!(
                    "{label} function handler cannot be empty"
                )));
            }
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        if config.retry.max_retries == 0 {
            return Err(ConfigError::InvalidMaxRetries(config.retry.max_retries));
        }

        if config.retry.initial_backoff_ms >= config.retry.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                config.retry.initial_backoff_ms,
                config.retry.max_backoff_ms,
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.stack.name, "agentic-rag");
        assert_eq!(config.bucket.expiry_days, 30);
        assert_eq!(config.retrieval.max_results, 5);
        assert_eq!(config.logging.level, "info");
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r"
stack:
  name: docs-rag
bucket:
  expiry_days: 7
models:
  temperature: 0.2
retrieval:
  max_results: 3
logging:
  level: debug
  format: json
";

        let config: Config = serde_yaml::from_str(yaml).expect("YAML should parse");

        assert_eq!(config.stack.name, "docs-rag");
        assert_eq!(config.bucket.expiry_days, 7);
        assert!((config.models.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(config.retrieval.max_results, 3);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "json");

        ConfigLoader::validate(&config).expect("Parsed config should be valid");
    }

    #[test]
    fn test_validate_rejects_uppercase_stack_name() {
        let mut config = Config::default();
        config.stack.name = "AgenticRag".to_string();

        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidStackName(_))
        ));
    }

    #[test]
    fn test_validate_rejects_long_stack_name() {
        let mut config = Config::default();
        config.stack.name = "a".repeat(21);

        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidStackName(_))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_expiry() {
        let mut config = Config::default();
        config.bucket.expiry_days = 0;

        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidExpiryDays(0))
        ));
    }

    #[test]
    fn test_validate_rejects_prefix_without_slash() {
        let mut config = Config::default();
        config.bucket.document_prefix = "documents".to_string();

        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::ValidationFailed(_))
        ));
    }

    #[test]
    fn test_validate_rejects_out_of_range_max_results() {
        for max_results in [0, 11] {
            let mut config = Config::default();
            config.retrieval.max_results = max_results;

            assert!(matches!(
                ConfigLoader::validate(&config),
                Err(ConfigError::InvalidMaxResults(_))
            ));
        }
    }

    #[test]
    fn test_validate_rejects_bad_temperature() {
        let mut config = Config::default();
        config.models.temperature = 1.5;

        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidTemperature(_))
        ));
    }

    #[test]
    fn test_validate_rejects_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "verbose".to_string();

        match ConfigLoader::validate(&config).unwrap_err() {
            ConfigError::InvalidLogLevel(level) => assert_eq!(level, "verbose"),
            other => panic!("Expected InvalidLogLevel, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_rejects_invalid_log_format() {
        let mut config = Config::default();
        config.logging.format = "xml".to_string();

        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidLogFormat(_))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_retries() {
        let mut config = Config::default();
        config.retry.max_retries = 0;

        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidMaxRetries(0))
        ));
    }

    #[test]
    fn test_validate_rejects_inverted_backoff() {
        let mut config = Config::default();
        config.retry.initial_backoff_ms = 30_000;
        config.retry.max_backoff_ms = 10_000;

        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidBackoff(30_000, 10_000))
        ));
    }

    #[test]
    fn test_validate_rejects_excessive_function_timeout() {
        let mut config = Config::default();
        config.functions.retrieval.timeout_secs = 901;

        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::ValidationFailed(_))
        ));
    }

    #[test]
    fn test_hierarchical_merging() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let mut base_file = NamedTempFile::new().unwrap();
        writeln!(
            base_file,
            "stack:\n  name: base-rag\nlogging:\n  level: info\n  format: json"
        )
        .unwrap();
        base_file.flush().unwrap();

        let mut override_file = NamedTempFile::new().unwrap();
        writeln!(override_file, "logging:\n  level: debug").unwrap();
        override_file.flush().unwrap();

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(base_file.path()))
            .merge(Yaml::file(override_file.path()))
            .extract()
            .unwrap();

        assert_eq!(config.stack.name, "base-rag", "base value persists");
        assert_eq!(config.logging.level, "debug", "override wins");
        assert_eq!(config.logging.format, "json", "unoverridden base persists");
    }

    #[test]
    fn test_env_override() {
        temp_env::with_vars(
            [
                ("RAGSTACK_STACK__NAME", Some("env-rag")),
                ("RAGSTACK_RETRIEVAL__MAX_RESULTS", Some("8")),
            ],
            || {
                let config: Config = Figment::new()
                    .merge(Serialized::defaults(Config::default()))
                    .merge(Env::prefixed("RAGSTACK_").split("__"))
                    .extract()
                    .unwrap();

                assert_eq!(config.stack.name, "env-rag");
                assert_eq!(config.retrieval.max_results, 8);
            },
        );
    }
}
