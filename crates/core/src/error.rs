//! Error types shared by the provider clients.

use crate::transcription::ConnectionState;
use thiserror::Error;

/// A failed request/response call to the completion or speech-synthesis provider.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The request never produced a response (DNS, TLS, connection reset, ...).
    #[error("transport failure: {0}")]
    Transport(String),

    /// The provider answered with a non-success HTTP status.
    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// The provider answered, but reported an API-level error.
    #[error("provider rejected the request: {0}")]
    Rejected(String),

    /// The response could not be interpreted.
    #[error("malformed provider payload: {0}")]
    MalformedPayload(String),
}

/// Failures of the live transcription connection.
#[derive(Error, Debug)]
pub enum TranscriptionError {
    #[error("failed to connect to transcription provider: {0}")]
    Connect(String),

    #[error("transcription connection is not open (state: {0:?})")]
    NotOpen(ConnectionState),

    #[error("transcription audio queue is full")]
    QueueFull,

    #[error("transcription connection task has stopped")]
    ChannelClosed,

    #[error("transcription stream error: {0}")]
    Stream(String),
}
