//! Turning a decoded report into a `LocationSample`.
//!
//! Rules, in order:
//!   1. identity must be non-empty after trimming
//!   2. lat/lon must be finite
//!   3. lat/lon outside [-90, 90] / [-180, 180] are rejected or flagged
//!      according to the configured `CoordinatePolicy`
//!   4. `when` falls back to the boundary-supplied date, then to now
//!   5. empty `token` / `ip` strings are treated as absent

use chrono::{SecondsFormat, Utc};
use tracing::warn;
use waypost_core::config::CoordinatePolicy;
use waypost_core::{Identity, LocationSample};
use waypost_protocol::report::ReportPayload;

use crate::error::{IngestError, Result};

/// Decode a raw report body.
pub fn parse(body: &[u8]) -> Result<ReportPayload> {
    serde_json::from_slice(body).map_err(|e| IngestError::malformed(e.to_string()))
}

/// Validate and normalize a decoded report.
///
/// `fallback_when` is used when the report carries no timestamp of its own
/// (the HTTP boundary passes the request's `Date` header).
pub fn normalize(
    report: ReportPayload,
    policy: CoordinatePolicy,
    fallback_when: Option<&str>,
) -> Result<LocationSample> {
    let identity = report
        .identity
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or(IngestError::InvalidIdentity)?;

    if !report.lat.is_finite() || !report.lon.is_finite() {
        return Err(IngestError::malformed("coordinates must be finite numbers"));
    }

    let when = non_empty(report.when)
        .or_else(|| non_empty(fallback_when.map(String::from)))
        .unwrap_or_else(now_rfc3339);

    let mut sample = LocationSample {
        identity: Identity::from(identity),
        token: non_empty(report.token),
        lat: report.lat,
        lon: report.lon,
        ip: non_empty(report.ip),
        when,
        out_of_range: false,
    };

    if !sample.in_range() {
        match policy {
            CoordinatePolicy::Reject => return Err(IngestError::malformed(range_reason(&sample))),
            CoordinatePolicy::Flag => {
                warn!(
                    identity = %sample.identity,
                    lat = sample.lat,
                    lon = sample.lon,
                    "accepting out-of-range coordinates"
                );
                sample.out_of_range = true;
            }
        }
    }

    Ok(sample)
}

/// Current instant as RFC 3339 UTC, e.g. `2024-05-01T12:00:00.123Z`.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn range_reason(sample: &LocationSample) -> String {
    if !(-90.0..=90.0).contains(&sample.lat) {
        format!("latitude {} out of range [-90, 90]", sample.lat)
    } else {
        format!("longitude {} out of range [-180, 180]", sample.lon)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(json: &str) -> ReportPayload {
        parse(json.as_bytes()).unwrap()
    }

    #[test]
    fn unparsable_body_is_malformed() {
        for body in ["", "not json", "{\"identity\":\"a\"", "[1,2]"] {
            let err = parse(body.as_bytes()).unwrap_err();
            assert_eq!(err.code(), "MALFORMED_INPUT", "body {body:?}");
        }
    }

    #[test]
    fn empty_or_missing_identity_is_rejected() {
        for json in [
            r#"{"identity":"","lat":1,"lon":1}"#,
            r#"{"identity":"   ","lat":1,"lon":1}"#,
            r#"{"lat":1,"lon":1}"#,
        ] {
            let err = normalize(report(json), CoordinatePolicy::Reject, None).unwrap_err();
            assert_eq!(err, IngestError::InvalidIdentity, "payload {json}");
        }
    }

    #[test]
    fn identity_is_trimmed() {
        let sample = normalize(
            report(r#"{"identity":" A ","lat":1,"lon":1}"#),
            CoordinatePolicy::Reject,
            None,
        )
        .unwrap();
        assert_eq!(sample.identity.as_str(), "A");
    }

    #[test]
    fn client_timestamp_wins_over_fallbacks() {
        let sample = normalize(
            report(r#"{"identity":"A","lat":1,"lon":1,"when":"t1"}"#),
            CoordinatePolicy::Reject,
            Some("Tue, 15 Nov 1994 08:12:31 GMT"),
        )
        .unwrap();
        assert_eq!(sample.when, "t1");
    }

    #[test]
    fn date_header_is_used_when_client_sends_none() {
        let sample = normalize(
            report(r#"{"identity":"A","lat":1,"lon":1,"when":""}"#),
            CoordinatePolicy::Reject,
            Some("Tue, 15 Nov 1994 08:12:31 GMT"),
        )
        .unwrap();
        assert_eq!(sample.when, "Tue, 15 Nov 1994 08:12:31 GMT");
    }

    #[test]
    fn server_assigns_timestamp_as_last_resort() {
        let sample = normalize(
            report(r#"{"identity":"A","lat":1,"lon":1}"#),
            CoordinatePolicy::Reject,
            None,
        )
        .unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(&sample.when).is_ok(), "got {}", sample.when);
    }

    #[test]
    fn out_of_range_rejected_by_default() {
        let err = normalize(
            report(r#"{"identity":"A","lat":91,"lon":0}"#),
            CoordinatePolicy::Reject,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, IngestError::MalformedInput { .. }));
        assert!(err.to_string().contains("latitude"));

        let err = normalize(
            report(r#"{"identity":"A","lat":0,"lon":-181}"#),
            CoordinatePolicy::Reject,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, IngestError::MalformedInput { .. }));
        assert!(err.to_string().contains("longitude"));
    }

    #[test]
    fn out_of_range_flagged_under_flag_policy() {
        let sample = normalize(
            report(r#"{"identity":"A","lat":91,"lon":0}"#),
            CoordinatePolicy::Flag,
            None,
        )
        .unwrap();
        assert!(sample.out_of_range);

        let sample = normalize(
            report(r#"{"identity":"A","lat":45,"lon":0}"#),
            CoordinatePolicy::Flag,
            None,
        )
        .unwrap();
        assert!(!sample.out_of_range);
    }

    #[test]
    fn empty_optional_strings_become_absent() {
        let sample = normalize(
            report(r#"{"identity":"A","token":"","ip":" ","lat":1,"lon":1}"#),
            CoordinatePolicy::Reject,
            None,
        )
        .unwrap();
        assert!(sample.token.is_none());
        assert!(sample.ip.is_none());
    }
}
