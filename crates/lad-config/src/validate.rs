//! Configuration validation errors and semantic validation.

use thiserror::Error;

use crate::LadConfig;

/// Validation result type.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Configuration validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Semantic validation failed: {0}")]
    SemanticError(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: String, actual: String },
}

impl ValidationError {
    /// Error code for structured error reporting.
    pub fn code(&self) -> u32 {
        match self {
            ValidationError::IoError(_) => 51,
            ValidationError::ParseError(_) => 52,
            ValidationError::SemanticError(_) => 53,
            ValidationError::InvalidValue { .. } => 54,
            ValidationError::VersionMismatch { .. } => 55,
        }
    }
}

impl From<ValidationError> for lad_common::Error {
    fn from(err: ValidationError) -> Self {
        lad_common::Error::Config(err.to_string())
    }
}

fn invalid(field: &str, message: impl Into<String>) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.to_string(),
        message: message.into(),
    }
}

/// Validate a configuration semantically.
pub fn validate_config(config: &LadConfig) -> ValidationResult<()> {
    if config.schema_version != crate::CONFIG_SCHEMA_VERSION {
        return Err(ValidationError::VersionMismatch {
            expected: crate::CONFIG_SCHEMA_VERSION.to_string(),
            actual: config.schema_version.clone(),
        });
    }

    let store = &config.store;
    if store.leaf_max_count == 0 {
        return Err(invalid("store.leaf_max_count", "Must be at least 1"));
    }
    if store.leaf_max_age_ms == Some(0) {
        return Err(invalid(
            "store.leaf_max_age_ms",
            "Must be positive when set (omit to disable)",
        ));
    }

    let reaper = &config.reaper;
    if reaper.interval_ms == 0 {
        return Err(invalid("reaper.interval_ms", "Must be positive"));
    }
    let threshold = reaper.memory_threshold_percent;
    if !threshold.is_finite() || threshold <= 0.0 || threshold > 100.0 {
        return Err(invalid(
            "reaper.memory_threshold_percent",
            format!("Must be in (0, 100], got {}", threshold),
        ));
    }
    if reaper.max_evictions_per_pass == 0 {
        return Err(invalid("reaper.max_evictions_per_pass", "Must be at least 1"));
    }
    if let (Some(retention), Some(protected)) =
        (reaper.retention_window_ms, reaper.protected_window_ms)
    {
        if protected >= retention {
            return Err(ValidationError::SemanticError(format!(
                "reaper.protected_window_ms ({}) must be shorter than reaper.retention_window_ms ({})",
                protected, retention
            )));
        }
    }

    Ok(())
}
