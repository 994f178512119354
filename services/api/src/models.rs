//! API Models
//!
//! Data structures shared by the session orchestrator and the REST API, with
//! `utoipa` schemas for the OpenAPI documentation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;

/// Where a session is in the listen → reply → speak cycle.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    /// Microphone audio is forwarded to transcription.
    #[default]
    Listening,
    /// An utterance was finalized; completion and synthesis are in flight.
    AwaitingReply,
    /// Synthesized audio was delivered and is assumed to be playing on the client.
    Speaking,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// One user utterance or assistant reply in a conversation.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Time-derived identifier. Collisions are tolerated.
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Only present on assistant messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_audio_playing: Option<bool>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content.into(), None)
    }

    /// An assistant reply, marked as playing until playback ends.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content.into(), Some(true))
    }

    fn new(role: MessageRole, content: String, is_audio_playing: Option<bool>) -> Self {
        let created_at = Utc::now();
        Self {
            id: created_at.timestamp_millis().to_string(),
            role,
            content,
            created_at,
            is_audio_playing,
        }
    }
}

/// A snapshot of one connected client session.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    #[schema(value_type = String, format = Uuid)]
    pub id: Uuid,
    pub connected_at: DateTime<Utc>,
    pub turn_state: TurnState,
    pub message_count: usize,
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}
