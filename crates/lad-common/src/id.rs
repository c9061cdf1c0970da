//! Venue, session, and client identity types.
//!
//! A downlink session is uniquely identified by (host, session number,
//! fragment); the venue names the processing context that produced it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Telemetry venue (ground station, test bed, operations string).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VenueId(pub String);

impl VenueId {
    pub fn new(name: impl Into<String>) -> Self {
        VenueId(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VenueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for VenueId {
    fn from(s: &str) -> Self {
        VenueId(s.to_string())
    }
}

/// Downlink session number plus fragment.
///
/// Long sessions roll over into numbered fragments; each fragment gets its
/// own branch in the container hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionKey {
    pub session_id: u64,
    pub fragment: u32,
}

impl SessionKey {
    pub fn new(session_id: u64, fragment: u32) -> Self {
        SessionKey {
            session_id,
            fragment,
        }
    }

    /// Parse the `<session>-<fragment>` form produced by `Display`.
    pub fn parse(s: &str) -> Option<Self> {
        let (session, fragment) = s.split_once('-')?;
        Some(SessionKey {
            session_id: session.parse().ok()?,
            fragment: fragment.parse().ok()?,
        })
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.session_id, self.fragment)
    }
}

/// Identity of a query client (REST caller, WebSocket subscriber).
///
/// Delta cursors and subscriptions are keyed by client id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub String);

impl ClientId {
    pub fn new(name: impl Into<String>) -> Self {
        ClientId(name.into())
    }

    /// Generate a fresh client id of the form `client-<12 hex>`.
    pub fn generate() -> Self {
        let uuid = uuid::Uuid::new_v4().simple().to_string();
        ClientId(format!("client-{}", &uuid[..12]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ClientId {
    fn from(s: &str) -> Self {
        ClientId(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_key_display_parse() {
        let key = SessionKey::new(4021, 3);
        assert_eq!(key.to_string(), "4021-3");
        assert_eq!(SessionKey::parse("4021-3"), Some(key));
        assert_eq!(SessionKey::parse("4021"), None);
        assert_eq!(SessionKey::parse("x-3"), None);
    }

    #[test]
    fn test_session_key_ordering() {
        assert!(SessionKey::new(1, 9) < SessionKey::new(2, 0));
        assert!(SessionKey::new(2, 0) < SessionKey::new(2, 1));
    }

    #[test]
    fn test_client_id_generate() {
        let a = ClientId::generate();
        let b = ClientId::generate();
        assert!(a.as_str().starts_with("client-"));
        assert_eq!(a.as_str().len(), 19);
        assert_ne!(a, b);
    }
}
