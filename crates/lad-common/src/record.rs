//! Telemetry records: the immutable value unit held by the store.
//!
//! A record carries an identifier (channel id, event id, product name),
//! the timestamps the ground system attached to it, a payload, and the
//! provenance of the downlink session that produced it.

use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::id::{SessionKey, VenueId};

/// Kind of telemetry a record belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataKind {
    /// Channel sample (engineering/health value).
    Channel,
    /// Event record (flight software log message).
    Event,
    /// Data-product marker (partial/complete product notice).
    Product,
    /// Alarm state transition.
    Alarm,
    /// Any other stream, by name.
    Other(String),
}

impl DataKind {
    pub fn as_str(&self) -> &str {
        match self {
            DataKind::Channel => "channel",
            DataKind::Event => "event",
            DataKind::Product => "product",
            DataKind::Alarm => "alarm",
            DataKind::Other(name) => name,
        }
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DataKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "" => Err("empty data kind".to_string()),
            "channel" | "eha" => Ok(DataKind::Channel),
            "event" | "evr" => Ok(DataKind::Event),
            "product" => Ok(DataKind::Product),
            "alarm" => Ok(DataKind::Alarm),
            other => Ok(DataKind::Other(other.to_string())),
        }
    }
}

/// Which timestamp orders records inside a leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeField {
    /// Earth-receive time.
    #[default]
    Ert,
    /// Spacecraft event time.
    Scet,
    /// Ground event time (when the record was produced on the ground).
    EventTime,
}

impl fmt::Display for TimeField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeField::Ert => write!(f, "ert"),
            TimeField::Scet => write!(f, "scet"),
            TimeField::EventTime => write!(f, "event_time"),
        }
    }
}

impl std::str::FromStr for TimeField {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ert" => Ok(TimeField::Ert),
            "scet" => Ok(TimeField::Scet),
            "event_time" | "event" => Ok(TimeField::EventTime),
            _ => Err(format!("unknown time field: {}", s)),
        }
    }
}

/// All timestamps attached to a record.
///
/// ERT is always present; the others depend on the record kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSet {
    pub ert: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scet: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_time: Option<DateTime<Utc>>,

    /// Raw spacecraft clock ticks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sclk: Option<u64>,
}

impl TimeSet {
    pub fn at_ert(ert: DateTime<Utc>) -> Self {
        TimeSet {
            ert,
            scet: None,
            event_time: None,
            sclk: None,
        }
    }

    /// Timestamp for `field`, falling back to ERT when the record lacks it.
    pub fn get(&self, field: TimeField) -> DateTime<Utc> {
        match field {
            TimeField::Ert => self.ert,
            TimeField::Scet => self.scet.unwrap_or(self.ert),
            TimeField::EventTime => self.event_time.unwrap_or(self.ert),
        }
    }
}

/// Typed payload value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypedValue {
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    Text(String),
    /// Enumerated status channel: data number plus state label.
    Status { dn: i64, label: String },
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypedValue::Int(v) => write!(f, "{}", v),
            TypedValue::UInt(v) => write!(f, "{}", v),
            TypedValue::Float(v) => write!(f, "{}", v),
            TypedValue::Bool(v) => write!(f, "{}", v),
            TypedValue::Text(v) => write!(f, "{}", v),
            TypedValue::Status { label, .. } => write!(f, "{}", label),
        }
    }
}

/// Record payload: opaque bytes or a decoded value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Payload {
    Bytes(#[serde(with = "base64_bytes")] Vec<u8>),
    Value(TypedValue),
}

/// Representation a caller wants a payload materialized into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Representation {
    #[default]
    Json,
    Numeric,
    Text,
    Raw,
}

impl fmt::Display for Representation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Representation::Json => write!(f, "json"),
            Representation::Numeric => write!(f, "numeric"),
            Representation::Text => write!(f, "text"),
            Representation::Raw => write!(f, "raw"),
        }
    }
}

/// A payload rendered into a requested representation.
#[derive(Debug, Clone, PartialEq)]
pub enum Materialized {
    Json(serde_json::Value),
    Numeric(f64),
    Text(String),
    Raw(Vec<u8>),
}

impl Materialized {
    /// JSON form for transport; raw bytes become a base64 string.
    pub fn into_json(self) -> serde_json::Value {
        match self {
            Materialized::Json(v) => v,
            Materialized::Numeric(v) => serde_json::json!(v),
            Materialized::Text(s) => serde_json::Value::String(s),
            Materialized::Raw(b) => serde_json::Value::String(BASE64.encode(b)),
        }
    }
}

impl Payload {
    fn type_name(&self) -> &'static str {
        match self {
            Payload::Bytes(_) => "bytes",
            Payload::Value(TypedValue::Int(_)) => "int",
            Payload::Value(TypedValue::UInt(_)) => "uint",
            Payload::Value(TypedValue::Float(_)) => "float",
            Payload::Value(TypedValue::Bool(_)) => "bool",
            Payload::Value(TypedValue::Text(_)) => "text",
            Payload::Value(TypedValue::Status { .. }) => "status",
        }
    }

    fn conversion_error(&self, to: Representation) -> Error {
        Error::Conversion {
            from: self.type_name().to_string(),
            to: to.to_string(),
        }
    }

    /// Canonical byte form used for hashing and raw export.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        match self {
            Payload::Bytes(b) => b.clone(),
            Payload::Value(TypedValue::Int(v)) => v.to_le_bytes().to_vec(),
            Payload::Value(TypedValue::UInt(v)) => v.to_le_bytes().to_vec(),
            Payload::Value(TypedValue::Float(v)) => v.to_bits().to_le_bytes().to_vec(),
            Payload::Value(TypedValue::Bool(v)) => vec![u8::from(*v)],
            Payload::Value(TypedValue::Text(v)) => v.as_bytes().to_vec(),
            Payload::Value(TypedValue::Status { dn, label }) => {
                let mut out = dn.to_le_bytes().to_vec();
                out.extend_from_slice(label.as_bytes());
                out
            }
        }
    }

    /// SHA-256 over the type tag and canonical bytes.
    ///
    /// Used as the payload component of the duplicate-detection key.
    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.type_name().as_bytes());
        hasher.update([0u8]);
        hasher.update(self.canonical_bytes());
        hasher.finalize().into()
    }

    pub fn digest_hex(&self) -> String {
        hex::encode(self.digest())
    }

    /// Materialize into the requested representation.
    pub fn materialize(&self, repr: Representation) -> Result<Materialized> {
        match repr {
            Representation::Json => Ok(Materialized::Json(self.to_json())),
            Representation::Numeric => self.as_f64().map(Materialized::Numeric),
            Representation::Text => self.as_text().map(Materialized::Text),
            Representation::Raw => Ok(Materialized::Raw(self.canonical_bytes())),
        }
    }

    pub fn as_f64(&self) -> Result<f64> {
        match self {
            Payload::Value(TypedValue::Int(v)) => Ok(*v as f64),
            Payload::Value(TypedValue::UInt(v)) => Ok(*v as f64),
            Payload::Value(TypedValue::Float(v)) => Ok(*v),
            Payload::Value(TypedValue::Bool(v)) => Ok(if *v { 1.0 } else { 0.0 }),
            Payload::Value(TypedValue::Status { dn, .. }) => Ok(*dn as f64),
            Payload::Value(TypedValue::Text(s)) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| self.conversion_error(Representation::Numeric)),
            Payload::Bytes(_) => Err(self.conversion_error(Representation::Numeric)),
        }
    }

    pub fn as_text(&self) -> Result<String> {
        match self {
            Payload::Value(v) => Ok(v.to_string()),
            Payload::Bytes(b) => String::from_utf8(b.clone())
                .map_err(|_| self.conversion_error(Representation::Text)),
        }
    }

    /// JSON rendering; bytes become base64 strings.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Payload::Bytes(b) => serde_json::json!({ "bytes": BASE64.encode(b) }),
            Payload::Value(TypedValue::Int(v)) => serde_json::json!(v),
            Payload::Value(TypedValue::UInt(v)) => serde_json::json!(v),
            Payload::Value(TypedValue::Float(v)) => serde_json::json!(v),
            Payload::Value(TypedValue::Bool(v)) => serde_json::json!(v),
            Payload::Value(TypedValue::Text(v)) => serde_json::json!(v),
            Payload::Value(TypedValue::Status { dn, label }) => {
                serde_json::json!({ "dn": dn, "label": label })
            }
        }
    }
}

/// Where a record came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    /// Host running the downlink pipeline.
    pub host: String,
    pub venue: VenueId,
    pub session: SessionKey,
    /// False for playback of recorded data.
    #[serde(default = "default_realtime")]
    pub realtime: bool,
}

fn default_realtime() -> bool {
    true
}

/// One immutable telemetry value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub identifier: String,
    pub kind: DataKind,
    pub times: TimeSet,
    pub payload: Payload,
    pub provenance: Provenance,
}

impl Record {
    pub fn new(
        identifier: impl Into<String>,
        kind: DataKind,
        times: TimeSet,
        payload: Payload,
        provenance: Provenance,
    ) -> Self {
        Record {
            identifier: identifier.into(),
            kind,
            times,
            payload,
            provenance,
        }
    }

    /// Ordering timestamp for the configured primary field.
    pub fn primary_time(&self, field: TimeField) -> DateTime<Utc> {
        self.times.get(field)
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        BASE64.decode(s.as_bytes()).map_err(serde::de::Error::custom)
    }
}
