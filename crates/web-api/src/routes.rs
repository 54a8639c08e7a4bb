use application::StatsSnapshot;
use axum::{
    extract::{ws::WebSocketUpgrade, State},
    response::Response,
    routing::get,
    Json, Router,
};
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::error::ApiError;
use crate::state::AppState;
use crate::websocket::AxumTransport;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(websocket_upgrade))
        .route("/health", get(health))
        .route("/stats", get(stats))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn stats(State(state): State<AppState>) -> Json<StatsSnapshot> {
    Json(state.service.stats().snapshot())
}

async fn websocket_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    if state.is_closing() {
        return Err(ApiError::service_unavailable("server is shutting down"));
    }

    let limit = state.service.settings().max_message_size;
    Ok(ws
        .max_message_size(limit)
        .max_frame_size(limit)
        .on_upgrade(move |socket| async move {
            let reason = state
                .service
                .serve_connection(AxumTransport::new(socket))
                .await;
            debug!(reason = ?reason, "websocket connection finished");
        }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use application::{ChatService, SessionSettings};
    use axum::{body::Body, http::Request, http::StatusCode};
    use tower::ServiceExt;

    fn test_state() -> AppState {
        AppState::new(ChatService::from_settings(SessionSettings::default()))
    }

    #[tokio::test]
    async fn test_health_returns_ok() {
        let response = router(test_state())
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_stats_returns_snapshot() {
        let state = test_state();
        state.service.stats().add_message();

        let response = router(state)
            .oneshot(Request::get("/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["total_messages"], 1);
        assert_eq!(json["active_connections"], 0);
    }
}
