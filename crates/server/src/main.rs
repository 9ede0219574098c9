//! Streamscribe server entry point

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use streamscribe_config::{load_settings, Settings};
use streamscribe_pipeline::{
    DispatcherConfig, EnergyVadFactory, PlaceholderStt, SttEngine, TranscriptionDispatcher,
};
use streamscribe_server::{create_router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env = std::env::var("STREAMSCRIBE_ENV").ok();
    let settings = load_settings(env.as_deref())?;

    init_tracing(&settings);
    tracing::info!("starting streamscribe v{}", env!("CARGO_PKG_VERSION"));

    // Models load once, before any session exists.
    let (engine, engine_loaded) = build_engine(&settings);
    let dispatcher = Arc::new(
        TranscriptionDispatcher::new(
            engine,
            DispatcherConfig {
                workers: settings.recognition.workers,
                max_queue_depth: settings.recognition.max_queue_depth,
                job_timeout: Duration::from_secs(settings.recognition.job_timeout_secs),
            },
        )
        .with_engine_loaded(engine_loaded),
    );
    tracing::info!(
        workers = settings.recognition.workers,
        model_loaded = engine_loaded,
        "transcription dispatcher ready"
    );

    let state = AppState::new(settings.clone(), dispatcher, Arc::new(EnergyVadFactory::default()));
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port).parse()?;
    tracing::info!(%addr, ws_path = %settings.server.ws_path, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received Ctrl+C, shutting down");
        }
        _ = terminate => {
            tracing::info!("received SIGTERM, shutting down");
        }
    }
}

fn init_tracing(settings: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "streamscribe={},tower_http=info",
            settings.observability.log_level
        )
        .into()
    });

    let fmt_layer = if settings.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

/// Build the speech-to-text engine configured for this deployment.
///
/// With the `whisper` feature and a model path, a local Whisper model is
/// loaded at startup; otherwise the placeholder engine keeps the service
/// functional without one.
fn build_engine(settings: &Settings) -> (Arc<dyn SttEngine>, bool) {
    #[cfg(feature = "whisper")]
    if let Some(model_path) = &settings.recognition.model_path {
        match streamscribe_pipeline::WhisperStt::load(std::path::Path::new(model_path)) {
            Ok(engine) => return (Arc::new(engine), true),
            Err(err) => {
                tracing::error!(error = %err, "failed to load whisper model, falling back to placeholder");
            }
        }
    }

    #[cfg(not(feature = "whisper"))]
    if settings.recognition.model_path.is_some() {
        tracing::warn!("recognition.model_path is set but this build lacks the `whisper` feature");
    }

    (Arc::new(PlaceholderStt::new()), false)
}
