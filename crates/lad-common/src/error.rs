//! Error types for the Global LAD.
//!
//! This module provides structured error handling with:
//! - Stable error codes for machine parsing
//! - Category classification for error grouping
//! - Recoverability hints for callers deciding whether to retry
//! - Suggested actions for front-ends relaying errors to clients
//!
//! # Agent-Facing Output
//!
//! Errors serialize to structured JSON:
//! ```json
//! {
//!   "code": 10,
//!   "category": "store",
//!   "message": "removal conflict on host1/42-0: 1 active reader(s), 0 subscription(s)",
//!   "recoverable": true,
//!   "suggested_action": "retry_with_force",
//!   "context": { "scope": "host1/42-0" }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Result type alias for LAD operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Structural operations on the container tree.
    Store,
    /// Query scoping and lookup.
    Query,
    /// Payload materialization.
    Conversion,
    /// Memory pressure and retention.
    Capacity,
    /// Configuration loading and validation.
    Config,
    /// File I/O and serialization errors.
    Io,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Store => write!(f, "store"),
            ErrorCategory::Query => write!(f, "query"),
            ErrorCategory::Conversion => write!(f, "conversion"),
            ErrorCategory::Capacity => write!(f, "capacity"),
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}

/// Suggested actions for callers in response to errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    /// Retry the operation (possibly with backoff).
    Retry,
    /// Repeat the removal with `force = true`.
    RetryWithForce,
    /// Fix the request (scope path, representation).
    FixRequest,
    /// Run configuration validation.
    RunCheck,
    /// Raise memory limits or shorten the retention window.
    Escalate,
    /// Abort the operation.
    Abort,
    /// No action needed (informational).
    None,
}

impl std::fmt::Display for SuggestedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SuggestedAction::Retry => write!(f, "retry"),
            SuggestedAction::RetryWithForce => write!(f, "retry_with_force"),
            SuggestedAction::FixRequest => write!(f, "fix_request"),
            SuggestedAction::RunCheck => write!(f, "run_check"),
            SuggestedAction::Escalate => write!(f, "escalate"),
            SuggestedAction::Abort => write!(f, "abort"),
            SuggestedAction::None => write!(f, "none"),
        }
    }
}

/// Unified error type for the LAD.
#[derive(Error, Debug)]
pub enum Error {
    // Store errors (10-19)
    #[error("removal conflict on {scope}: {readers} active reader(s), {subscriptions} subscription(s)")]
    Conflict {
        scope: String,
        readers: usize,
        subscriptions: usize,
    },

    // Query errors (20-29)
    #[error("invalid scope path: {0}")]
    InvalidScope(String),

    #[error("nothing stored under {0}")]
    NotFound(String),

    // Conversion errors (30-39)
    #[error("cannot materialize {from} payload as {to}")]
    Conversion { from: String, to: String },

    // Capacity errors (40-49)
    #[error("memory pressure persists at {used_percent:.1}% (threshold {threshold_percent:.1}%): {remaining} record(s) are inside the protected window")]
    CapacityExhausted {
        used_percent: f64,
        threshold_percent: f64,
        remaining: u64,
    },

    // Config errors (50-59)
    #[error("configuration error: {0}")]
    Config(String),

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the error code for this error type.
    ///
    /// Error codes are stable and grouped by category:
    /// - 10-19: Store errors
    /// - 20-29: Query errors
    /// - 30-39: Conversion errors
    /// - 40-49: Capacity errors
    /// - 50-59: Configuration errors
    /// - 60-69: I/O errors
    pub fn code(&self) -> u32 {
        match self {
            Error::Conflict { .. } => 10,
            Error::InvalidScope(_) => 20,
            Error::NotFound(_) => 21,
            Error::Conversion { .. } => 30,
            Error::CapacityExhausted { .. } => 40,
            Error::Config(_) => 50,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
        }
    }

    /// Returns the error category for grouping and filtering.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Conflict { .. } => ErrorCategory::Store,
            Error::InvalidScope(_) | Error::NotFound(_) => ErrorCategory::Query,
            Error::Conversion { .. } => ErrorCategory::Conversion,
            Error::CapacityExhausted { .. } => ErrorCategory::Capacity,
            Error::Config(_) => ErrorCategory::Config,
            Error::Io(_) | Error::Json(_) => ErrorCategory::Io,
        }
    }

    /// Returns whether this error is potentially recoverable.
    pub fn is_recoverable(&self) -> bool {
        match self {
            // Caller may retry with force or once the reader finishes
            Error::Conflict { .. } => true,
            Error::InvalidScope(_) => false,
            Error::NotFound(_) => true,
            Error::Conversion { .. } => false,
            // Operator must act; the store itself cannot resolve it
            Error::CapacityExhausted { .. } => false,
            Error::Config(_) => true,
            Error::Io(_) => true,
            Error::Json(_) => false,
        }
    }

    /// Returns the suggested action for callers.
    pub fn suggested_action(&self) -> SuggestedAction {
        match self {
            Error::Conflict { .. } => SuggestedAction::RetryWithForce,
            Error::InvalidScope(_) => SuggestedAction::FixRequest,
            Error::NotFound(_) => SuggestedAction::None,
            Error::Conversion { .. } => SuggestedAction::FixRequest,
            Error::CapacityExhausted { .. } => SuggestedAction::Escalate,
            Error::Config(_) => SuggestedAction::RunCheck,
            Error::Io(_) => SuggestedAction::Retry,
            Error::Json(_) => SuggestedAction::Abort,
        }
    }

    /// Returns a short headline for human-readable output.
    pub fn headline(&self) -> &'static str {
        match self {
            Error::Conflict { .. } => "Removal Conflict",
            Error::InvalidScope(_) => "Invalid Scope",
            Error::NotFound(_) => "Not Found",
            Error::Conversion { .. } => "Conversion Error",
            Error::CapacityExhausted { .. } => "Capacity Exhausted",
            Error::Config(_) => "Configuration Error",
            Error::Io(_) => "I/O Error",
            Error::Json(_) => "JSON Error",
        }
    }
}

/// Structured error response for JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// Stable error code.
    pub code: u32,

    /// Error category for grouping.
    pub category: ErrorCategory,

    /// Human-readable error message.
    pub message: String,

    /// Whether the error is potentially recoverable.
    pub recoverable: bool,

    /// Suggested action for callers.
    pub suggested_action: SuggestedAction,

    /// Additional structured context (e.g., scope path).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
}

impl From<&Error> for StructuredError {
    fn from(err: &Error) -> Self {
        let mut context = HashMap::new();

        match err {
            Error::Conflict {
                scope,
                readers,
                subscriptions,
            } => {
                context.insert("scope".to_string(), serde_json::json!(scope));
                context.insert("readers".to_string(), serde_json::json!(readers));
                context.insert("subscriptions".to_string(), serde_json::json!(subscriptions));
            }
            Error::InvalidScope(scope) | Error::NotFound(scope) => {
                context.insert("scope".to_string(), serde_json::json!(scope));
            }
            Error::CapacityExhausted {
                used_percent,
                threshold_percent,
                remaining,
            } => {
                context.insert("used_percent".to_string(), serde_json::json!(used_percent));
                context.insert(
                    "threshold_percent".to_string(),
                    serde_json::json!(threshold_percent),
                );
                context.insert("remaining".to_string(), serde_json::json!(remaining));
            }
            _ => {}
        }

        StructuredError {
            code: err.code(),
            category: err.category(),
            message: err.to_string(),
            recoverable: err.is_recoverable(),
            suggested_action: err.suggested_action(),
            context,
        }
    }
}

impl StructuredError {
    /// Add additional context to the error.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"code":{},"error":"serialization_failed"}}"#, self.code)
        })
    }
}

/// Format an error for human-readable stderr output.
pub fn format_error_human(err: &Error, use_color: bool) -> String {
    let (red, reset) = if use_color {
        ("\x1b[31m", "\x1b[0m")
    } else {
        ("", "")
    };

    format!(
        "{red}✗{reset} {headline}\n  Reason: {message}\n  Action: {action}",
        red = red,
        reset = reset,
        headline = err.headline(),
        message = err,
        action = err.suggested_action()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conflict() -> Error {
        Error::Conflict {
            scope: "host1/42-0".into(),
            readers: 1,
            subscriptions: 0,
        }
    }

    #[test]
    fn test_error_code() {
        assert_eq!(conflict().code(), 10);
        assert_eq!(Error::InvalidScope("x".into()).code(), 20);
        assert_eq!(Error::Config("test".into()).code(), 50);
    }

    #[test]
    fn test_error_category() {
        assert_eq!(conflict().category(), ErrorCategory::Store);
        assert_eq!(
            Error::Conversion {
                from: "bytes".into(),
                to: "numeric".into()
            }
            .category(),
            ErrorCategory::Conversion
        );
    }

    #[test]
    fn test_conflict_is_recoverable_with_force() {
        let err = conflict();
        assert!(err.is_recoverable());
        assert_eq!(err.suggested_action(), SuggestedAction::RetryWithForce);
    }

    #[test]
    fn test_capacity_exhausted_not_recoverable() {
        let err = Error::CapacityExhausted {
            used_percent: 93.0,
            threshold_percent: 80.0,
            remaining: 12,
        };
        assert!(!err.is_recoverable());
        assert_eq!(err.suggested_action(), SuggestedAction::Escalate);
    }

    #[test]
    fn test_structured_error_json() {
        let structured = StructuredError::from(&conflict());
        let json = structured.to_json();

        assert!(json.contains(r#""code":10"#));
        assert!(json.contains(r#""category":"store""#));
        assert!(json.contains(r#""suggested_action":"retry_with_force""#));
        assert_eq!(
            structured.context.get("scope"),
            Some(&serde_json::json!("host1/42-0"))
        );
    }

    #[test]
    fn test_format_error_human() {
        let formatted = format_error_human(&Error::InvalidScope("a/b/c/d/e".into()), false);
        assert!(formatted.contains("Invalid Scope"));
        assert!(formatted.contains("fix_request"));
    }
}
