//! Error types for the churn core

use thiserror::Error;

/// Errors that can occur while configuring, scoring or packaging a churn model
#[derive(Error, Debug)]
pub enum ChurnError {
    /// Invalid configuration, detected before any training work starts
    #[error("Configuration error in `{field}`: {message}")]
    Configuration { field: String, message: String },

    /// Input data violates an assumption the pipeline relies on
    #[error("Data integrity error: {0}")]
    DataIntegrity(String),

    /// Model structure is invalid
    #[error("Model validation failed: {0}")]
    ModelValidation(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML configuration could not be parsed
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// TOML configuration could not be parsed
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl ChurnError {
    /// Build a configuration error for the given dotted field path
    pub fn config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn data(message: impl Into<String>) -> Self {
        Self::DataIntegrity(message.into())
    }
}

/// Result type for churn core operations
pub type Result<T> = std::result::Result<T, ChurnError>;
