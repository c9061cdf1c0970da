//! Global LAD common types, identities, and errors.
//!
//! This crate provides the vocabulary shared by the store, configuration,
//! and CLI crates:
//! - Telemetry records with their timestamps, payloads, and provenance
//! - Venue, session, and client identity types
//! - The unified error taxonomy with stable codes

pub mod error;
pub mod id;
pub mod record;

pub use error::{Error, ErrorCategory, Result, StructuredError, SuggestedAction};
pub use id::{ClientId, SessionKey, VenueId};
pub use record::{
    DataKind, Materialized, Payload, Provenance, Record, Representation, TimeField, TimeSet,
    TypedValue,
};
