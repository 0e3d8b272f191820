use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use waypost_core::config::WaypostConfig;
use waypost_fanout::Broadcaster;
use waypost_history::HistoryStore;
use waypost_ingest::IngestService;

/// Central shared state: passed as Arc<AppState> to all Axum handlers.
///
/// Built once in `main`; the store and broadcaster live exactly as long as
/// the server does.
pub struct AppState {
    pub config: WaypostConfig,
    pub store: Arc<HistoryStore>,
    pub broadcaster: Arc<Broadcaster>,
    pub ingest: IngestService,
}

impl AppState {
    pub fn new(config: WaypostConfig) -> Self {
        let store = Arc::new(HistoryStore::with_retention(config.history.retention));
        let broadcaster = Arc::new(Broadcaster::new(config.fanout.queue_capacity));
        let ingest = IngestService::new(
            Arc::clone(&store),
            Arc::clone(&broadcaster),
            config.ingest.coordinates,
        );
        Self {
            config,
            store,
            broadcaster,
            ingest,
        }
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    let max_body = state.config.gateway.max_payload_bytes;
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/report", post(crate::http::report::report_handler))
        .route("/get/{identity}", get(crate::http::history::history_handler))
        .route("/history/{identity}", get(crate::http::history::history_handler))
        .route("/ws", get(crate::ws::connection::ws_handler))
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_body))
        // viewers may be served from another origin
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
