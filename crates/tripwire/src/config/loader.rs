use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    let threshold = config.detection.threshold;
    if !(0.0..=1.0).contains(&threshold) {
        return Err(ConfigError::Validation {
            message: format!("detection.threshold must be within [0, 1], got {}", threshold),
        });
    }

    config
        .detection
        .weights
        .validate()
        .map_err(|message| ConfigError::Validation {
            message: format!("detection.weights: {}", message),
        })?;

    if config.diff.max_cells == 0 {
        return Err(ConfigError::Validation {
            message: "diff.max_cells must be positive".to_string(),
        });
    }

    config
        .encoder
        .validate()
        .map_err(|e| ConfigError::Validation {
            message: format!("encoder: {}", e),
        })?;

    if let Some(endpoint) = &config.suggestion.endpoint {
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(ConfigError::Validation {
                message: format!("suggestion.endpoint must be an http(s) URL, got '{}'", endpoint),
            });
        }
    }
    if config.suggestion.timeout_secs == 0 {
        return Err(ConfigError::Validation {
            message: "suggestion.timeout_secs must be positive".to_string(),
        });
    }

    // A live suggestion call must not be mistaken for an abandoned one.
    if config.pipeline.stage_lease_secs <= config.suggestion.timeout_secs {
        return Err(ConfigError::Validation {
            message: format!(
                "pipeline.stage_lease_secs ({}) must exceed suggestion.timeout_secs ({})",
                config.pipeline.stage_lease_secs, config.suggestion.timeout_secs
            ),
        });
    }

    if config.interview.verdict_marker.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "interview.verdict_marker must not be empty".to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_minimal_config() {
        let config = load_config_from_str(r#"{ "version": "1.0" }"#).unwrap();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.detection.threshold, 0.5);
    }

    #[test]
    fn test_load_full_config() {
        let config_json = r#"
        {
            "version": "1.0",
            "database_path": "/var/lib/tripwire/tripwire.db",
            "storage_directory": "/var/lib/tripwire/documents",
            "detection": {
                "threshold": 0.6,
                "fuzzy": false,
                "weights": { "number": 1.0, "word": 0.5 }
            },
            "diff": { "max_cells": 1000000 },
            "encoder": { "font_size": 11, "margin": 72 },
            "suggestion": {
                "endpoint": "https://suggest.example.edu/v1/mutate",
                "api_key_env_var": "TRIPWIRE_SUGGEST_KEY",
                "timeout_secs": 15
            },
            "interview": { "verdict_marker": "VERDICT:" }
        }
        "#;

        let config = load_config_from_str(config_json).unwrap();
        assert_eq!(config.database_path, "/var/lib/tripwire/tripwire.db");
        assert_eq!(config.detection.threshold, 0.6);
        assert!(!config.detection.fuzzy);
        assert_eq!(config.detection.weights.word, 0.5);
        assert_eq!(config.detection.weights.phrase, 0.9);
        assert_eq!(config.diff.max_cells, 1_000_000);
        assert_eq!(config.encoder.font_size, 11.0);
        assert_eq!(config.encoder.page_width, 612.0);
        assert_eq!(config.suggestion.timeout_secs, 15);
    }

    #[test]
    fn test_invalid_version() {
        let result = load_config_from_str(r#"{ "version": "2.0" }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_version_fails_schema() {
        let result = load_config_from_str(r#"{ "database_path": "x.db" }"#);
        assert!(matches!(result, Err(ConfigError::SchemaValidation { .. })));
    }

    #[test]
    fn test_unknown_key_fails_schema() {
        let result = load_config_from_str(r#"{ "version": "1.0", "workers": 4 }"#);
        assert!(matches!(result, Err(ConfigError::SchemaValidation { .. })));
    }

    #[test]
    fn test_threshold_out_of_range() {
        let result = load_config_from_str(r#"{ "version": "1.0", "detection": { "threshold": 1.5 } }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_negative_weight_rejected() {
        let result = load_config_from_str(
            r#"{ "version": "1.0", "detection": { "weights": { "number": -1 } } }"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_endpoint_must_be_http() {
        let result = load_config_from_str(
            r#"{ "version": "1.0", "suggestion": { "endpoint": "ftp://example.com" } }"#,
        );
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_encoder_page_too_small() {
        let result = load_config_from_str(
            r#"{ "version": "1.0", "encoder": { "page_width": 80, "margin": 50 } }"#,
        );
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("tripwire.json");
        std::fs::write(&path, r#"{ "version": "1.0", "detection": { "threshold": 0.25 } }"#).unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.detection.threshold, 0.25);

        let missing = load_config(dir.path().join("missing.json"));
        assert!(matches!(missing, Err(ConfigError::ReadFile { .. })));
    }
}
