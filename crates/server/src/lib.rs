//! Streamscribe server
//!
//! Fronts the recognition pipeline with two surfaces: the audio WebSocket
//! that streams PCM in and VAD/recognition events out, and the admin HTTP
//! API for health and audio-log configuration.

pub mod http;
pub mod session;
pub mod state;
pub mod websocket;

pub use http::create_router;
pub use session::{Session, SessionManager};
pub use state::AppState;

use thiserror::Error;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("session limit reached ({0} active)")]
    SessionLimit(usize),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServerError> for axum::http::StatusCode {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::SessionLimit(_) => axum::http::StatusCode::SERVICE_UNAVAILABLE,
            ServerError::WebSocket(_) => axum::http::StatusCode::BAD_REQUEST,
            ServerError::Internal(_) => axum::http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
