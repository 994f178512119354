//! Defines the WebSocket message protocol between the browser client and the API server.
//!
//! Microphone audio travels as binary frames. Everything else is a JSON text
//! frame tagged by `type`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Messages sent from the client (browser) to the server.
#[derive(Deserialize, Debug, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// User-typed text that bypasses transcription.
    TextMessage { text: String },
    /// The client finished playing the assistant's audio.
    PlaybackEnded,
    /// Asks the server to open a fresh transcription connection.
    Reconnect,
}

/// Messages sent from the server to the client (browser).
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once, right after the connection is accepted.
    SessionStarted { session_id: Uuid },
    /// An interim transcript, superseded by the next one.
    Transcript { text: String },
    /// A finalized user utterance.
    FinalTranscript { text: String },
    /// The assistant's reply text. Always precedes its audio.
    AiResponse { text: String },
    /// Synthesized speech (base64 encoded `audio/mpeg`).
    AudioData { data: String },
    /// A user-facing failure notice.
    Error { message: String },
    /// The transcription connection is being re-established.
    Reconnecting,
}
