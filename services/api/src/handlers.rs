//! Axum Handlers for the REST API
//!
//! Read-only views over the live session registry. They use `utoipa` doc
//! comments to generate OpenAPI documentation.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    models::{ErrorResponse, HealthResponse, Message, SessionSummary},
    state::AppState,
};

pub enum ApiError {
    NotFound(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(ErrorResponse { message })).into_response()
            }
        }
    }
}

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse)
    )
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// List every connected session, oldest first.
#[utoipa::path(
    get,
    path = "/sessions",
    responses(
        (status = 200, description = "Connected sessions", body = [SessionSummary])
    )
)]
pub async fn list_sessions(State(state): State<Arc<AppState>>) -> Json<Vec<SessionSummary>> {
    Json(state.registry.summaries().await)
}

/// Get the conversation history of a connected session.
#[utoipa::path(
    get,
    path = "/sessions/{id}/messages",
    responses(
        (status = 200, description = "Messages in the order they were recorded", body = [Message]),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(
        ("id" = Uuid, Path, description = "Session ID")
    )
)]
pub async fn get_session_messages(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let record = state
        .registry
        .get(id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Session with id '{}' not found", id)))?;

    let messages = record.lock().await.messages.clone();
    Ok(Json(messages))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{models::TurnState, state::SessionServices, ws::registry::SessionRegistry};
    use std::time::Duration;
    use voicegpt_core::{
        completion::MockCompletionClient,
        speech::MockSpeechSynthesizer,
        transcription::{DeepgramTranscriber, TranscriptionOptions},
    };

    fn test_state() -> Arc<AppState> {
        Arc::new(AppState {
            registry: Arc::new(SessionRegistry::new()),
            services: SessionServices {
                transcription: Arc::new(DeepgramTranscriber::new(
                    "dg".into(),
                    TranscriptionOptions::default(),
                )),
                completion: Arc::new(MockCompletionClient::new()),
                synthesis: Arc::new(MockSpeechSynthesizer::new()),
                reconnect_retry_delay: Duration::from_millis(10),
            },
        })
    }

    #[tokio::test]
    async fn test_health() {
        let Json(body) = health().await;
        assert_eq!(body.status, "ok");
    }

    #[tokio::test]
    async fn test_list_sessions() {
        let state = test_state();
        let Json(sessions) = list_sessions(State(state.clone())).await;
        assert!(sessions.is_empty());

        let id = Uuid::new_v4();
        state.registry.register(id).await;
        let Json(sessions) = list_sessions(State(state)).await;
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, id);
        assert_eq!(sessions[0].turn_state, TurnState::Listening);
    }

    #[tokio::test]
    async fn test_get_session_messages() {
        let state = test_state();
        let id = Uuid::new_v4();
        let record = state.registry.register(id).await;
        record.lock().await.messages.push(Message::user("how are you"));
        record
            .lock()
            .await
            .messages
            .push(Message::assistant("I'm doing well"));

        let Json(messages) = get_session_messages(State(state), Path(id))
            .await
            .unwrap_or_else(|_| panic!("session should exist"));
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "how are you");
        assert_eq!(messages[1].is_audio_playing, Some(true));
    }

    #[tokio::test]
    async fn test_get_session_messages_not_found() {
        let state = test_state();
        let response = get_session_messages(State(state), Path(Uuid::new_v4()))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
