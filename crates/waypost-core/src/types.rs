use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Key under which location samples are grouped (a device or phone identifier).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Identity(pub String);

impl Identity {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Identity {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Identity {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Per-subscription identifier (random UUID, never reused).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriberId(pub String);

impl SubscriberId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One accepted location report.
///
/// Samples are shared as `Arc<LocationSample>` between the history store and
/// every subscriber queue, and are never mutated after ingest.
/// Wire: `{ "identity": "kali-device", "lat": 10.0, "lon": 20.0, "when": "..." }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    pub identity: Identity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub lat: f64,
    pub lon: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    /// ISO-8601 instant, client-supplied or assigned at ingest.
    pub when: String,
    /// Set when the coordinates fall outside the geographic range and the
    /// ingest policy accepted them anyway.
    #[serde(default, skip_serializing_if = "is_false")]
    pub out_of_range: bool,
}

impl LocationSample {
    pub fn new(identity: impl Into<Identity>, lat: f64, lon: f64, when: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            token: None,
            lat,
            lon,
            ip: None,
            when: when.into(),
            out_of_range: false,
        }
    }

    /// True when latitude is within [-90, 90] and longitude within [-180, 180].
    pub fn in_range(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lon)
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}
