//! Global LAD configuration loading and validation.
//!
//! This crate provides:
//! - Typed Rust structs for store and reaper settings
//! - Config resolution (CLI → env → XDG → /etc → defaults)
//! - JSON and TOML loading, chosen by file extension
//! - Semantic validation

pub mod reaper;
pub mod resolve;
pub mod store;
pub mod validate;

use std::path::Path;

use serde::{Deserialize, Serialize};

pub use reaper::ReaperConfig;
pub use resolve::{resolve_config, ConfigSource, ResolvedPath};
pub use store::{DeltaStart, StoreConfig};
pub use validate::{validate_config, ValidationError, ValidationResult};

/// Schema version for configuration files.
pub const CONFIG_SCHEMA_VERSION: &str = "1.0.0";

/// Complete LAD configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LadConfig {
    pub schema_version: String,
    pub store: StoreConfig,
    pub reaper: ReaperConfig,
}

impl Default for LadConfig {
    fn default() -> Self {
        LadConfig {
            schema_version: CONFIG_SCHEMA_VERSION.to_string(),
            store: StoreConfig::default(),
            reaper: ReaperConfig::default(),
        }
    }
}

impl LadConfig {
    /// Load configuration from a JSON or TOML file.
    pub fn from_file(path: &Path) -> ValidationResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ValidationError::IoError(format!("Failed to read {}: {}", path.display(), e))
        })?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::parse_toml(&content),
            _ => Self::parse_json(&content),
        }
    }

    /// Parse configuration from a JSON string.
    pub fn parse_json(json: &str) -> ValidationResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| ValidationError::ParseError(format!("Invalid JSON: {}", e)))
    }

    /// Parse configuration from a TOML string.
    pub fn parse_toml(text: &str) -> ValidationResult<Self> {
        toml::from_str(text)
            .map_err(|e| ValidationError::ParseError(format!("Invalid TOML: {}", e)))
    }

    /// Resolve, load, and validate. Falls back to defaults when no file is found.
    pub fn load(cli_path: Option<&Path>) -> ValidationResult<(Self, ResolvedPath)> {
        let resolved = resolve_config(cli_path);
        let config = match resolved.path {
            Some(ref path) => Self::from_file(path)?,
            None => LadConfig::default(),
        };
        validate_config(&config)?;
        Ok((config, resolved))
    }
}
