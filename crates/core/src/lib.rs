//! Provider-facing building blocks for the voice assistant.
//!
//! - `transcription`: the live streaming bridge to the speech-to-text provider.
//! - `completion`: request/response wrapper around the chat completion API.
//! - `speech`: request/response wrapper around the text-to-speech API.

pub mod completion;
pub mod error;
pub mod speech;
pub mod transcription;

pub use error::{ProviderError, TranscriptionError};
