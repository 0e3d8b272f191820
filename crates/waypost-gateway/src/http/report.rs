//! Location ingest endpoint: POST /report
//!
//! Request:  `{"identity": "kali-device", "lat": 12.9, "lon": 77.5,
//!             "token": "...", "ip": "...", "when": "..."}`
//!           (`phone` is accepted in place of `identity`)
//! Response: `{"status": "ok"}`
//! Error:    400 `{"status": "error", "code": "...", "error": "..."}`
//!
//! The token is carried through to the sample but never checked.

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    Json,
};
use std::sync::Arc;
use waypost_protocol::report::{Ack, Rejection};

use crate::app::AppState;

/// POST /report: validate, store, and broadcast one location sample.
///
/// The body is taken raw so that unparsable JSON is reported with the same
/// rejection shape as any other validation failure.
pub async fn report_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Ack>, (StatusCode, Json<Rejection>)> {
    let date = headers.get(header::DATE).and_then(|v| v.to_str().ok());

    match state.ingest.accept_dated(&body, date) {
        Ok(_) => Ok(Json(Ack::ok())),
        Err(e) => Err((
            StatusCode::BAD_REQUEST,
            Json(Rejection::new(e.code(), e.to_string())),
        )),
    }
}
