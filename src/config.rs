//! Session configuration
//!
//! Loaded from JSON; every field has a default so an empty object is valid.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// How nested columns are spelled in accessor declarations
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmitOptions {
    /// Container for column groups, e.g. `DataRow<R1>`
    pub row_type: String,
    /// Container for frame columns, e.g. `DataFrame<R1>`
    pub frame_type: String,
}

impl Default for EmitOptions {
    fn default() -> Self {
        Self {
            row_type: "DataRow".to_string(),
            frame_type: "DataFrame".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Synthesized markers are named `<marker_prefix><counter>`
    pub marker_prefix: String,
    pub emit: EmitOptions,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            marker_prefix: "R".to_string(),
            emit: EmitOptions::default(),
        }
    }
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
}

impl SessionConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: SessionConfig = serde_json::from_str(text)
            .map_err(|e| ConfigError::DeserializationError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_identifier(&self.marker_prefix) {
            return Err(ConfigError::Invalid(format!(
                "marker_prefix must be an identifier, got {:?}",
                self.marker_prefix
            )));
        }
        for (field, value) in [
            ("emit.row_type", &self.emit.row_type),
            ("emit.frame_type", &self.emit.frame_type),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{} must not be empty", field)));
            }
        }
        Ok(())
    }
}
