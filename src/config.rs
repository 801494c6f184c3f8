use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;
use validator::{Validate, ValidationError};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    #[error("Parse error for {field}: {value} - {source}")]
    Parse {
        field: String,
        value: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Compiler limits and defaults
#[derive(Clone, Debug, Validate, Serialize, Deserialize)]
#[validate(schema(function = "validate_limits"))]
#[serde(default)]
pub struct CompilerConfig {
    /// Page size applied to list reads that give none; `None` leaves them unbounded
    #[validate(range(min = 1, message = "Default limit must be at least 1"))]
    pub default_limit: Option<u64>,

    /// Upper bound on any requested page size
    #[validate(range(min = 1, message = "Max limit must be at least 1"))]
    pub max_limit: Option<u64>,

    /// Maximum nesting of operations in one request (1-64)
    #[validate(range(
        min = 1,
        max = 64,
        message = "Max query depth must be between 1 and 64"
    ))]
    pub max_query_depth: u32,

    /// Message raised by validation assertions
    #[validate(length(min = 1, message = "Forbidden message cannot be empty"))]
    pub forbidden_message: String,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            default_limit: None,
            max_limit: None,
            max_query_depth: 16,
            forbidden_message: "Forbidden".to_string(),
        }
    }
}

impl CompilerConfig {
    /// Create configuration from environment variables with validation
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            default_limit: parse_optional_env_var("GRAPHCYPHER_DEFAULT_LIMIT")?,
            max_limit: parse_optional_env_var("GRAPHCYPHER_MAX_LIMIT")?,
            max_query_depth: parse_env_var("GRAPHCYPHER_MAX_QUERY_DEPTH", "16")?,
            forbidden_message: env::var("GRAPHCYPHER_FORBIDDEN_MESSAGE")
                .unwrap_or_else(|_| "Forbidden".to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    /// Create configuration from YAML file
    pub fn from_yaml_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Parse {
            field: "yaml_file".to_string(),
            value: "file read failed".to_string(),
            source: Box::new(e),
        })?;

        let config: Self = serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
            field: "yaml_content".to_string(),
            value: content,
            source: Box::new(e),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Effective page size for a list read: the requested value (or the
    /// entity/global default) capped by the entity/global maximum.
    pub fn effective_limit(
        &self,
        requested: Option<u64>,
        entity_default: Option<u64>,
        entity_max: Option<u64>,
    ) -> Option<u64> {
        let limit = requested.or(entity_default).or(self.default_limit);
        match (limit, entity_max.or(self.max_limit)) {
            (Some(limit), Some(max)) => Some(limit.min(max)),
            (None, Some(max)) => Some(max),
            (limit, None) => limit,
        }
    }
}

fn validate_limits(config: &CompilerConfig) -> Result<(), ValidationError> {
    match (config.default_limit, config.max_limit) {
        (Some(default), Some(max)) if default > max => {
            let mut error = ValidationError::new("limits");
            error.message = Some("Default limit cannot exceed max limit".into());
            Err(error)
        }
        _ => Ok(()),
    }
}

/// Parse an environment variable with a default value
fn parse_env_var<T: std::str::FromStr>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value = env::var(key).unwrap_or_else(|_| default.to_string());
    value.parse().map_err(|e| ConfigError::Parse {
        field: key.to_string(),
        value,
        source: Box::new(e),
    })
}

fn parse_optional_env_var<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value.parse().map(Some).map_err(|e| ConfigError::Parse {
            field: key.to_string(),
            value,
            source: Box::new(e),
        }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = CompilerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_query_depth, 16);
        assert_eq!(config.default_limit, None);
        assert_eq!(config.forbidden_message, "Forbidden");
    }

    #[test]
    fn test_invalid_query_depth() {
        let config = CompilerConfig {
            max_query_depth: 0, // Invalid
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_above_max() {
        let config = CompilerConfig {
            default_limit: Some(100),
            max_limit: Some(10),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_effective_limit() {
        let config = CompilerConfig {
            default_limit: Some(20),
            max_limit: Some(100),
            ..Default::default()
        };
        assert_eq!(config.effective_limit(None, None, None), Some(20));
        assert_eq!(config.effective_limit(Some(500), None, None), Some(100));
        assert_eq!(config.effective_limit(None, Some(10), Some(50)), Some(10));
        assert_eq!(config.effective_limit(Some(70), Some(10), Some(50)), Some(50));
        assert_eq!(CompilerConfig::default().effective_limit(None, None, None), None);
    }

    #[test]
    #[serial]
    fn test_from_env() {
        env::set_var("GRAPHCYPHER_DEFAULT_LIMIT", "25");
        env::set_var("GRAPHCYPHER_MAX_QUERY_DEPTH", "8");
        let config = CompilerConfig::from_env().unwrap();
        env::remove_var("GRAPHCYPHER_DEFAULT_LIMIT");
        env::remove_var("GRAPHCYPHER_MAX_QUERY_DEPTH");
        assert_eq!(config.default_limit, Some(25));
        assert_eq!(config.max_limit, None);
        assert_eq!(config.max_query_depth, 8);
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_garbage() {
        env::set_var("GRAPHCYPHER_MAX_LIMIT", "lots");
        let result = CompilerConfig::from_env();
        env::remove_var("GRAPHCYPHER_MAX_LIMIT");
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_from_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "default_limit: 5\nmax_query_depth: 4").unwrap();
        let config = CompilerConfig::from_yaml_file(file.path()).unwrap();
        assert_eq!(config.default_limit, Some(5));
        assert_eq!(config.max_query_depth, 4);
        assert_eq!(config.forbidden_message, "Forbidden");
    }
}
