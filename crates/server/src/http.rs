//! HTTP endpoints
//!
//! Admin surface: health, audio-log configuration, and log listing /
//! download. Audio streaming itself lives on the WebSocket route.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use streamscribe_audiolog::{
    list_pairs, validate_client_filename, AudioLogConfig, AudioLogConfigUpdate,
};

use crate::state::AppState;
use crate::websocket::audio_socket;

type ApiError = (StatusCode, Json<serde_json::Value>);

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let ws_path = state.settings.server.ws_path.clone();

    Router::new()
        // Audio socket
        .route(&ws_path, get(audio_socket))

        // Health
        .route("/health", get(health_check))

        // Audio log administration
        .route(
            "/config/audio-log",
            get(get_audio_log_config).post(update_audio_log_config),
        )
        .route("/logs/audio/list", get(list_audio_logs))
        .route("/logs/audio/download/:filename", get(download_audio_log))

        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Health check
async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "active_sessions": state.sessions.count(),
        "model_loaded": state.dispatcher.engine_loaded(),
        "audio_log_enabled": state.audio_log_config.snapshot().enabled,
        "recognition_workers": state.dispatcher.active_workers(),
    }))
}

/// Current audio-log configuration snapshot.
async fn get_audio_log_config(State(state): State<AppState>) -> Json<AudioLogConfig> {
    Json(state.audio_log_config.snapshot())
}

/// Apply a partial audio-log configuration update.
///
/// Invalid input returns 400 and leaves the configuration unchanged; the
/// response on success is the new full snapshot.
async fn update_audio_log_config(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<AudioLogConfig>, ApiError> {
    let update: AudioLogConfigUpdate =
        serde_json::from_value(body).map_err(|err| bad_request(err.to_string()))?;

    state
        .audio_log_config
        .apply(update)
        .map(Json)
        .map_err(|err| bad_request(err.to_string()))
}

/// List `(raw, meta)` pairs, newest first.
async fn list_audio_logs(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let dir = state.audio_log_config.snapshot().output_dir;
    let entries = tokio::task::spawn_blocking(move || list_pairs(&dir))
        .await
        .map_err(|err| internal_error(err.to_string()))?
        .map_err(|err| internal_error(err.to_string()))?;

    Ok(Json(json!({
        "files": entries,
        "total": entries.len(),
    })))
}

/// Download one raw file.
async fn download_audio_log(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    let snapshot = state.audio_log_config.snapshot();
    if !snapshot.enabled {
        return Err((
            StatusCode::FORBIDDEN,
            Json(json!({"error": "audio logging is disabled"})),
        ));
    }

    validate_client_filename(&filename).map_err(|err| bad_request(err.to_string()))?;

    let path = snapshot.output_dir.join(&filename);
    let bytes = tokio::fs::read(&path).await.map_err(|_| {
        (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "audio file not found"})),
        )
    })?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        bytes,
    )
        .into_response())
}

fn bad_request(message: String) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({"error": message})))
}

fn internal_error(message: String) -> ApiError {
    tracing::error!(%message, "admin endpoint failure");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": message})),
    )
}
