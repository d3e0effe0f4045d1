//! Axum API server binary.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vdetect_api::{create_router, metrics, ApiConfig, AppState};
use vdetect_engine::{InferenceEngine, LoadPolicy, ModelSettings, RetryConfig};
use vdetect_media::{check_ffmpeg, check_ffprobe, SamplerConfig};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Install rustls crypto provider (required for rustls 0.23+)
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("rustls crypto provider was already installed");
    }

    init_tracing();

    info!("Starting vdetect-api");

    let config = ApiConfig::from_env();
    let settings = ModelSettings::from_env();
    let sampler = SamplerConfig::from_env();
    info!(
        host = %config.host,
        port = config.port,
        model = %settings.repo_id,
        load_policy = settings.load_policy.as_str(),
        "Configuration loaded"
    );

    if let Err(e) = check_ffmpeg() {
        warn!(error = %e, "FFmpeg unavailable, analyses will fail");
    }
    if let Err(e) = check_ffprobe() {
        warn!(error = %e, "FFprobe unavailable, analyses will fail");
    }

    let state = AppState::new(config.clone(), settings, sampler);

    // Initialize metrics
    let metrics_enabled = std::env::var("METRICS_ENABLED")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(true);

    let metrics_handle = if metrics_enabled {
        match metrics::init_metrics() {
            Ok(handle) => {
                info!("Prometheus metrics enabled at /metrics");
                Some(handle)
            }
            Err(e) => {
                warn!(error = %e, "Failed to install Prometheus recorder, metrics disabled");
                None
            }
        }
    } else {
        None
    };

    if state.model.load_policy == LoadPolicy::Eager {
        if let Some(engine) = state.engine.clone() {
            tokio::spawn(supervise_eager_load(engine));
        }
    }

    let app = create_router(state, metrics_handle);

    let addr: SocketAddr = match format!("{}:{}", config.host, config.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!(error = %e, "Invalid bind address");
            std::process::exit(1);
        }
    };

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, %addr, "Failed to bind");
            std::process::exit(1);
        }
    };

    info!("Listening on {}", addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = %e, "Server error");
    }

    info!("Server shutdown complete");
}

/// Colored output for dev, JSON when `LOG_FORMAT=json`.
fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let mut env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    for directive in ["vdetect=info", "ort=warn"] {
        if let Ok(directive) = directive.parse() {
            env_filter = env_filter.add_directive(directive);
        }
    }

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

/// Load at startup, retrying while the repository is unreachable.
async fn supervise_eager_load(engine: Arc<InferenceEngine>) {
    let retry = RetryConfig::from_env("eager_model_load");
    match engine.load_with_retry(&retry).await {
        Ok(()) => info!(model = %engine.model_name(), "Model loaded at startup"),
        Err(e) => error!(
            model = %engine.model_name(),
            code = e.code(),
            error = %e,
            "Startup model load failed; analyses will return model_not_ready"
        ),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}
