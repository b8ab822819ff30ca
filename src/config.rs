use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;
use validator::Validate;

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

/// Limits and switches of the navigation expansion pass
#[derive(Clone, Debug, PartialEq, Validate, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpansionConfig {
    /// Longest relationship chain a single navigation may walk
    #[validate(range(
        min = 1,
        max = 64,
        message = "Max navigation depth must be between 1 and 64"
    ))]
    pub max_navigation_depth: u32,

    /// Deepest operator nesting, subqueries included
    #[validate(range(
        min = 1,
        max = 4096,
        message = "Max operator depth must be between 1 and 4096"
    ))]
    pub max_operator_depth: u32,

    /// Whether string-path `Include("A.B")` hints are bound like lambda ones
    pub expand_string_includes: bool,
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            max_navigation_depth: 16,
            max_operator_depth: 512,
            expand_string_includes: true,
        }
    }
}

impl ExpansionConfig {
    /// Create configuration from environment variables with validation
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            max_navigation_depth: parse_env_var("NAVEXPAND_MAX_NAVIGATION_DEPTH", "16")?,
            max_operator_depth: parse_env_var("NAVEXPAND_MAX_OPERATOR_DEPTH", "512")?,
            expand_string_includes: parse_env_var("NAVEXPAND_EXPAND_STRING_INCLUDES", "true")?,
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

    /// Apply command-line overrides on top of this configuration
    pub fn merge(&mut self, overrides: ConfigOverrides) -> Result<(), ConfigError> {
        if let Some(depth) = overrides.max_navigation_depth {
            self.max_navigation_depth = depth;
        }
        if let Some(depth) = overrides.max_operator_depth {
            self.max_operator_depth = depth;
        }
        if overrides.no_string_includes {
            self.expand_string_includes = false;
        }
        self.validate()?;
        Ok(())
    }
}

/// Values given on the command line, each overriding the loaded configuration
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub max_navigation_depth: Option<u32>,
    pub max_operator_depth: Option<u32>,
    pub no_string_includes: bool,
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
