//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the REST API, WebSocket endpoint, and OpenAPI documentation.

use crate::{
    handlers,
    models::{ErrorResponse, HealthResponse, Message, MessageRole, SessionSummary, TurnState},
    state::AppState,
    ws::ws_handler,
};

use axum::{Router, routing::get};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::list_sessions,
        handlers::get_session_messages,
    ),
    components(
        schemas(SessionSummary, Message, MessageRole, TurnState, HealthResponse, ErrorResponse)
    ),
    tags(
        (name = "VoiceGPT API", description = "Live session inspection for the voice assistant")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route("/sessions", get(handlers::list_sessions))
        .route("/sessions/{id}/messages", get(handlers::get_session_messages))
        .route("/ws", get(ws_handler))
        .with_state(app_state);

    // Swagger UI and the health probe need no state.
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(handlers::health))
        .merge(api_router)
}
