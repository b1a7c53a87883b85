//! HTTP Endpoints
//!
//! Incoming-call webhook, media stream route and operational endpoints.

use axum::{
    extract::{Json, Path, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use call_bridge_agent::greeting_script;

use crate::metrics::metrics_handler;
use crate::state::AppState;
use crate::websocket::MediaStreamHandler;
use crate::ServerError;

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let config = state.get_config();
    let incoming_call_path = config.server.incoming_call_path.clone();
    let ws_path = config.server.ws_path.clone();
    let cors_layer = build_cors_layer(config.server.cors_enabled);
    drop(config); // Release lock before building router

    Router::new()
        // Twilio webhooks
        .route(&incoming_call_path, post(incoming_call).get(describe))
        .route(&ws_path, get(MediaStreamHandler::handle))
        // Calls
        .route("/api/calls", get(list_calls))
        .route("/api/calls/:id", get(get_call))
        // Health check
        .route("/health", get(health_check))
        // Prometheus metrics
        .route("/metrics", get(metrics_handler))
        // Admin
        .route("/admin/reload-config", post(reload_config))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
}

fn build_cors_layer(enabled: bool) -> CorsLayer {
    if !enabled {
        // No CORS headers; browsers fall back to same-origin
        return CorsLayer::new();
    }

    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

/// Incoming call webhook
///
/// POST /
///
/// Greets the caller and connects the call's audio to the media stream
/// websocket on this server.
async fn incoming_call(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let host = headers.get(header::HOST).and_then(|h| h.to_str().ok());
    let Some(stream_url) = state.stream_url(host) else {
        tracing::warn!("Incoming call without Host header and no public host configured");
        return Err(StatusCode::from(ServerError::InvalidRequest(
            "missing Host header".to_string(),
        )));
    };

    let script = greeting_script(&state.get_config().call, &stream_url);
    let twiml = call_bridge_telephony::render(&script);

    metrics::counter!("call_bridge_incoming_calls_total").increment(1);
    tracing::info!(stream_url = %stream_url, "Incoming call answered");

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/xml")],
        twiml,
    ))
}

/// GET /
async fn describe() -> &'static str {
    "Call bridge: Twilio media streams to live transcription and spoken knowledge answers.\n"
}

/// List live calls
async fn list_calls(State(state): State<AppState>) -> Json<serde_json::Value> {
    let calls = state.calls.snapshots();
    Json(serde_json::json!({
        "calls": calls,
        "count": calls.len(),
        "max_calls": state.calls.capacity(),
    }))
}

async fn get_call(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<call_bridge_agent::CallSnapshot>, StatusCode> {
    state
        .calls
        .get(&id)
        .map(|call| Json(call.snapshot()))
        .ok_or_else(|| ServerError::CallNotFound(id).into())
}

async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let live = state.calls.count();
    let capacity = state.calls.capacity();
    let at_capacity = live >= capacity;

    let status_code = if at_capacity {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (
        status_code,
        Json(serde_json::json!({
            "status": if at_capacity { "saturated" } else { "healthy" },
            "version": env!("CARGO_PKG_VERSION"),
            "calls": { "live": live, "max": capacity },
            "adapters": {
                "speech": state.collaborators.recognizer.name(),
                "knowledge": state.collaborators.knowledge.name(),
                "call_control": state.collaborators.control.name(),
            }
        })),
    )
}

/// Config reload endpoint
///
/// POST /admin/reload-config
async fn reload_config(State(state): State<AppState>) -> impl IntoResponse {
    match state.reload_config() {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "success",
                "message": "Configuration reloaded successfully"
            })),
        ),
        Err(e) => {
            tracing::error!("Config reload failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "status": "error",
                    "message": e
                })),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::tests::idle_collaborators;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use call_bridge_config::Settings;
    use tower::ServiceExt;

    fn router() -> Router {
        create_router(AppState::new(Settings::default(), idle_collaborators()))
    }

    async fn body_string(response: axum::response::Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_incoming_call_returns_greeting_twiml() {
        let response = router()
            .oneshot(
                Request::post("/")
                    .header("host", "abc.ngrok.app")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/xml");
        let body = body_string(response).await;
        assert!(body.contains("<Say>Start speaking.</Say>"));
        assert!(body.contains(r#"<Connect><Stream url="wss://abc.ngrok.app/realtime"/></Connect>"#));
    }

    #[tokio::test]
    async fn test_describe_and_health() {
        let response = router()
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_string(response).await.starts_with("Call bridge"));

        let response = router()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let health: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(health["status"], "healthy");
        assert_eq!(health["adapters"]["speech"], "silent");
    }

    #[tokio::test]
    async fn test_calls_endpoints() {
        let response = router()
            .oneshot(Request::get("/api/calls").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let calls: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(calls["count"], 0);
        assert_eq!(calls["max_calls"], 100);

        let response = router()
            .oneshot(Request::get("/api/calls/unknown").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
