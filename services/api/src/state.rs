//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds all shared,
//! clonable resources like provider clients and the session registry.

use crate::ws::registry::SessionRegistry;
use std::{sync::Arc, time::Duration};
use voicegpt_core::{
    completion::CompletionClient, speech::SpeechSynthesizer,
    transcription::TranscriptionProvider,
};

/// The provider clients and timing policy every session orchestrator uses.
#[derive(Clone)]
pub struct SessionServices {
    pub transcription: Arc<dyn TranscriptionProvider>,
    pub completion: Arc<dyn CompletionClient>,
    pub synthesis: Arc<dyn SpeechSynthesizer>,
    /// How long to wait before resending a chunk that triggered a reconnect.
    pub reconnect_retry_delay: Duration,
}

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub services: SessionServices,
}
