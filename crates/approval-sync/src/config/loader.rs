use std::path::Path;

use reqwest::Url;

use crate::config::schema::Config;
use crate::discovery::ItemStatus;
use crate::error::ConfigError;
use crate::secrets::SecretSource;

const SCHEMA_JSON: &str = include_str!("../../schema/config-v1.json");

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

    let base = Url::parse(&config.site.base_url).map_err(|e| ConfigError::InvalidUrl {
        url: config.site.base_url.clone(),
        reason: e.to_string(),
    })?;
    if base.cannot_be_a_base() || !matches!(base.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidUrl {
            url: config.site.base_url.clone(),
            reason: "base URL must be an absolute http(s) URL".to_string(),
        });
    }

    if config.download.concurrency == 0 || config.download.retry_concurrency == 0 {
        return Err(ConfigError::Validation {
            message: "download concurrency limits must be at least 1".to_string(),
        });
    }

    if ItemStatus::from_name(&config.download.target_status).is_none() {
        return Err(ConfigError::Validation {
            message: format!(
                "Unknown target status '{}'",
                config.download.target_status
            ),
        });
    }

    if !config.credentials.manual_login && config.credentials.username.is_empty() {
        return Err(ConfigError::Validation {
            message: "credentials.username is required unless manual_login is set".to_string(),
        });
    }

    if !config.credentials.manual_login
        && !SecretSource::password(&config.credentials).is_configured()
    {
        return Err(ConfigError::Validation {
            message: "a password source is required unless manual_login is set".to_string(),
        });
    }

    Ok(())
}
