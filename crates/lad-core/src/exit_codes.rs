//! Exit codes for the `lad` CLI.
//!
//! Exit codes communicate operation outcome without requiring output parsing.
//!
//! - 0: success
//! - 1: runtime failure (I/O, conversion, capacity exhausted after reaping)
//! - 2: usage or configuration error

/// Exit codes for `lad` operations.
///
/// These codes are a stable contract for automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Success
    Clean = 0,

    /// The command ran but failed (I/O, capacity, rendering)
    RuntimeError = 1,

    /// Invalid arguments or configuration
    UsageError = 2,
}

impl ExitCode {
    /// Convert to i32 for process exit.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn is_success(self) -> bool {
        self == ExitCode::Clean
    }

    /// Get the error code name as a string constant (for JSON output).
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Clean => "OK",
            ExitCode::RuntimeError => "ERR_RUNTIME",
            ExitCode::UsageError => "ERR_USAGE",
        }
    }

    /// Exit code for a store or config error.
    pub fn for_error(err: &lad_common::Error) -> Self {
        use lad_common::ErrorCategory;
        match err.category() {
            ErrorCategory::Config | ErrorCategory::Query => ExitCode::UsageError,
            _ => ExitCode::RuntimeError,
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}
