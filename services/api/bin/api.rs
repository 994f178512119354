//! Main Entrypoint for the VoiceGPT API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Initializing the transcription, completion and synthesis clients.
//! 3. Constructing the Axum router and applying middleware.
//! 4. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use async_openai::config::OpenAIConfig;
use axum::http::HeaderValue;
use std::{net::SocketAddr, sync::Arc};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{error, info};
use voicegpt_api::{
    config::{Config, CorsOrigin},
    router::create_router,
    state::{AppState, SessionServices},
    ws::registry::SessionRegistry,
};
use voicegpt_core::{
    completion::OpenAICompletionClient, speech::ElevenLabsSynthesizer,
    transcription::DeepgramTranscriber,
};

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal. Shutting down gracefully...");
}

fn cors_layer(origin: &CorsOrigin) -> anyhow::Result<CorsLayer> {
    let allow_origin = match origin {
        CorsOrigin::Any => AllowOrigin::from(Any),
        CorsOrigin::Exact(origin) => AllowOrigin::exact(
            HeaderValue::from_str(origin).context("CORS_ORIGIN is not a valid header value")?,
        ),
    };
    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing provider clients...");

    // --- 3. Initialize Shared Services ---
    let openai_config = OpenAIConfig::new().with_api_key(&config.openai_api_key);
    let services = SessionServices {
        transcription: Arc::new(DeepgramTranscriber::new(
            config.deepgram_api_key.clone(),
            config.transcription.clone(),
        )),
        completion: Arc::new(OpenAICompletionClient::new(
            openai_config,
            config.chat_model.clone(),
            config.system_prompt.clone(),
        )),
        synthesis: Arc::new(
            ElevenLabsSynthesizer::new(
                config.elevenlabs_api_key.clone(),
                config.elevenlabs_voice_id.clone(),
            )
            .with_api_base(config.elevenlabs_api_base.clone()),
        ),
        reconnect_retry_delay: config.reconnect_retry_delay,
    };

    let app_state = Arc::new(AppState {
        registry: Arc::new(SessionRegistry::new()),
        services,
    });

    // --- 4. Create Router and Apply Middleware ---
    let app = create_router(app_state).layer(cors_layer(&config.cors_origin)?);

    // --- 5. Start Server ---
    info!(
        model = %config.chat_model,
        voice = %config.elevenlabs_voice_id,
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_address))?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
