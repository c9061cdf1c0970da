//! Global LAD Core Library
//!
//! This library backs the `lad` binary:
//! - Exit codes for CLI operations
//! - Structured logging setup
//! - Offline replay of JSONL record streams into a store
//!
//! The binary entry point is in `main.rs`.

pub mod exit_codes;
pub mod logging;
pub mod replay;
