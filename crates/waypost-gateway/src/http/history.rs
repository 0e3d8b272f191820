//! History query: GET /get/{identity} (also /history/{identity}).
//!
//! Viewers call this after their WebSocket subscription is live to catch
//! up on samples published before they connected.
//!
//! Response: `{"identity": "A", "locations": [{...}, ...]}`, oldest first.
//! An unknown identity yields an empty list, never an error.

use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;
use waypost_core::Identity;
use waypost_protocol::report::HistoryResponse;

use crate::app::AppState;

pub async fn history_handler(
    State(state): State<Arc<AppState>>,
    Path(identity): Path<String>,
) -> Json<HistoryResponse> {
    let identity = Identity::from(identity);
    let locations = state.store.get(&identity);
    Json(HistoryResponse {
        identity,
        locations,
    })
}
