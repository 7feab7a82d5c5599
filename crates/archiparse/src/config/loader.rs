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

    if config.upload_directory.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "upload_directory must not be empty".to_string(),
        });
    }

    if config.allowed_extensions.is_empty() {
        return Err(ConfigError::Validation {
            message: "allowed_extensions must list at least one extension".to_string(),
        });
    }
    for ext in &config.allowed_extensions {
        if !ext.starts_with('.') || ext.len() < 2 {
            return Err(ConfigError::Validation {
                message: format!("Invalid extension '{}': expected a leading dot", ext),
            });
        }
    }

    if config.max_file_size == 0 || config.worker_count == 0 || config.api.timeout_secs == 0 {
        return Err(ConfigError::Validation {
            message: "max_file_size, worker_count and api.timeout_secs must be positive"
                .to_string(),
        });
    }

    let polling = &config.polling;
    if polling.list_interval_ms == 0 || polling.detail_interval_ms == 0 {
        return Err(ConfigError::Validation {
            message: "Polling intervals must be positive".to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_valid_config() {
        let config_json = r#"
        {
            "version": "1.0",
            "upload_directory": "/srv/uploads",
            "database_path": "/srv/archiparse.db",
            "max_file_size": 1048576,
            "allowed_extensions": [".IFCXML"],
            "worker_count": 4,
            "polling": { "detail_interval_ms": 500 },
            "api": { "base_url": "https://bim.example.com/api/v1", "email": "ops@example.com" }
        }
        "#;

        let config = load_config_from_str(config_json).unwrap();
        assert_eq!(config.worker_count, 4);
        assert_eq!(config.upload_limits().allowed_extensions, vec![".ifcxml"]);
        assert_eq!(config.polling.detail_interval_ms, 500);
        assert_eq!(config.polling.list_interval_ms, 5000);
        assert_eq!(config.polling.max_consecutive_errors, 5);
        assert_eq!(config.api.timeout_secs, 30);
        assert_eq!(
            config.database_path().unwrap().to_str(),
            Some("/srv/archiparse.db")
        );
    }

    #[test]
    fn test_defaults() {
        let config = load_config_from_str(
            r#"{ "version": "1.0", "upload_directory": "/srv/uploads" }"#,
        )
        .unwrap();
        assert_eq!(config.max_file_size, 500 * 1024 * 1024);
        assert_eq!(config.allowed_extensions, vec![".ifcxml", ".xml"]);
        assert!(config.worker_count > 0);
        assert_eq!(config.api.base_url, "http://localhost:8000/api/v1");
        assert!(!config.api.has_password_source());
    }

    #[test]
    fn test_invalid_version() {
        let result = load_config_from_str(
            r#"{ "version": "2.0", "upload_directory": "/srv/uploads" }"#,
        );
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_missing_required_field() {
        let result = load_config_from_str(r#"{ "version": "1.0" }"#);
        assert!(matches!(result, Err(ConfigError::SchemaValidation { .. })));
    }

    #[test]
    fn test_extension_without_dot() {
        let result = load_config_from_str(
            r#"{ "version": "1.0", "upload_directory": "/u", "allowed_extensions": ["ifcxml"] }"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_worker_count() {
        let result = load_config_from_str(
            r#"{ "version": "1.0", "upload_directory": "/u", "worker_count": 0 }"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_quota_limits() {
        let config = load_config_from_str(
            r#"{
                "version": "1.0",
                "upload_directory": "/u",
                "quota": {
                    "max_files_per_month": 3,
                    "tenants": {
                        "6f1c2a4e-8d3b-4c5f-9a7e-2b1d0c9e8f7a": { "max_storage_bytes": 1024 }
                    }
                }
            }"#,
        )
        .unwrap();
        let tenant = uuid::Uuid::parse_str("6f1c2a4e-8d3b-4c5f-9a7e-2b1d0c9e8f7a").unwrap();
        assert_eq!(config.quota.defaults.max_files_per_month, 3);
        assert_eq!(config.quota.limits_for(tenant).max_storage_bytes, 1024);

        let result = load_config_from_str(
            r#"{ "version": "1.0", "upload_directory": "/u", "quota": { "max_files": 3 } }"#,
        );
        assert!(matches!(result, Err(ConfigError::SchemaValidation { .. })));
    }
}
