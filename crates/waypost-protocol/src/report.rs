use serde::{Deserialize, Serialize};
use std::sync::Arc;
use waypost_core::{Identity, LocationSample};

/// Reporter → Server location report, body of `POST /report`.
///
/// `phone` is accepted as an alias of `identity` for reporters built against
/// the original field name. `identity` is optional at the wire level so a
/// missing value is reported as an identity error, not a parse error.
#[derive(Debug, Clone, Deserialize)]
pub struct ReportPayload {
    #[serde(default, alias = "phone")]
    pub identity: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub when: Option<String>,
}

/// Acknowledgment for an accepted report.
/// Wire: `{ "status": "ok" }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ack {
    pub status: String,
}

impl Ack {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

/// Rejection body for a report that failed validation.
/// Wire: `{ "status": "error", "code": "INVALID_IDENTITY", "error": "..." }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rejection {
    pub status: String,
    pub code: String,
    pub error: String,
}

impl Rejection {
    pub fn new(code: &str, reason: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            code: code.to_string(),
            error: reason.into(),
        }
    }
}

/// Response of the history query, `GET /get/{identity}`.
/// Wire: `{ "identity": "A", "locations": [ {...}, {...} ] }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub identity: Identity,
    pub locations: Vec<Arc<LocationSample>>,
}
