//! Session Orchestrator
//!
//! One orchestrator runs per connected client. It owns the turn state
//! machine, the client channel and the session's transcription connection,
//! and it is the only place where those are mutated. Everything that can
//! affect the session (client frames, transcription callbacks, provider
//! results, the reconnect retry timer) arrives as a [`SessionEvent`] on a
//! single queue and is handled strictly in order, so a turn always emits
//! `final_transcript`, then `ai_response`, then `audio_data`.

use super::{
    channel::ClientChannel,
    protocol::{ClientMessage, ServerMessage},
    registry::SharedSessionRecord,
    turn::TurnEvent,
};
use crate::{
    models::{Message, MessageRole, TurnState},
    state::SessionServices,
};
use base64::Engine;
use bytes::Bytes;
use std::ops::ControlFlow;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{Instrument, debug, error, info, warn};
use uuid::Uuid;
use voicegpt_core::{
    ProviderError,
    transcription::{
        ConnectionState, TranscriptionCallback, TranscriptionConnection, TranscriptionEvent,
    },
};


/// Capacity of each session's event queue.
pub const EVENT_QUEUE_DEPTH: usize = 256;

const PROVIDER_FAILURE_NOTICE: &str = "Sorry, I encountered an error processing your message.";
const BUSY_NOTICE: &str = "Please wait until I finish replying before sending another message.";

/// Everything the orchestrator reacts to.
#[derive(Debug)]
pub enum SessionEvent {
    /// A raw microphone frame from the client.
    Audio(Bytes),
    /// User-typed text, treated exactly like a final transcript.
    Text(String),
    PlaybackEnded,
    /// Explicit request for a fresh transcription connection.
    Reconnect,
    /// The client went away. Ends the session.
    Disconnected,
    /// A callback from the transcription connection with this generation.
    Transcription {
        generation: u64,
        event: TranscriptionEvent,
    },
    /// The delayed resend of a chunk that arrived while disconnected.
    RetryChunk { id: u64, chunk: Bytes },
    Completion {
        turn: u64,
        result: Result<String, ProviderError>,
    },
    Synthesis {
        turn: u64,
        result: Result<Vec<u8>, ProviderError>,
    },
}

impl From<ClientMessage> for SessionEvent {
    fn from(msg: ClientMessage) -> Self {
        match msg {
            ClientMessage::TextMessage { text } => SessionEvent::Text(text),
            ClientMessage::PlaybackEnded => SessionEvent::PlaybackEnded,
            ClientMessage::Reconnect => SessionEvent::Reconnect,
        }
    }
}

/// The one delayed resend a session may have outstanding.
struct PendingRetry {
    id: u64,
    timer: JoinHandle<()>,
}

pub struct Orchestrator {
    session_id: Uuid,
    services: SessionServices,
    client: ClientChannel,
    events_tx: mpsc::Sender<SessionEvent>,
    record: SharedSessionRecord,
    state: TurnState,
    /// Incremented for every accepted utterance.
    turn: u64,
    transcription: Option<Box<dyn TranscriptionConnection>>,
    /// Incremented for every opened transcription connection.
    generation: u64,
    /// Pending until its `RetryChunk` is handled, not merely until the timer fires.
    retry: Option<PendingRetry>,
    retry_seq: u64,
    ended: bool,
}

impl Orchestrator {
    pub fn new(
        session_id: Uuid,
        services: SessionServices,
        client: ClientChannel,
        events_tx: mpsc::Sender<SessionEvent>,
        record: SharedSessionRecord,
    ) -> Self {
        Self {
            session_id,
            services,
            client,
            events_tx,
            record,
            state: TurnState::Listening,
            turn: 0,
            transcription: None,
            generation: 0,
            retry: None,
            retry_seq: 0,
            ended: false,
        }
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    /// Processes events until the client disconnects, then tears down.
    pub async fn run(mut self, mut events: mpsc::Receiver<SessionEvent>) {
        info!(session_id = %self.session_id, "Session orchestrator started.");
        while let Some(event) = events.recv().await {
            if self.handle(event).await.is_break() {
                break;
            }
        }
        self.teardown().await;
        info!(session_id = %self.session_id, "Session orchestrator stopped.");
    }

    /// Applies a single event. Returns `Break` once the session is over.
    pub async fn handle(&mut self, event: SessionEvent) -> ControlFlow<()> {
        if self.ended {
            debug!(?event, "Session already ended; discarding event.");
            return ControlFlow::Break(());
        }
        match event {
            SessionEvent::Audio(chunk) => self.on_audio(chunk).await,
            SessionEvent::Text(text) => self.on_text(text).await,
            SessionEvent::PlaybackEnded => self.on_playback_ended().await,
            SessionEvent::Reconnect => self.on_reconnect_requested().await,
            SessionEvent::Transcription { generation, event } => {
                self.on_transcription(generation, event).await
            }
            SessionEvent::RetryChunk { id, chunk } => self.on_retry(id, chunk),
            SessionEvent::Completion { turn, result } => self.on_completion(turn, result).await,
            SessionEvent::Synthesis { turn, result } => self.on_synthesis(turn, result).await,
            SessionEvent::Disconnected => {
                info!("Client disconnected; ending session.");
                self.teardown().await;
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    // --- Client input ---

    async fn on_audio(&mut self, chunk: Bytes) {
        match self.state {
            TurnState::AwaitingReply => {
                debug!("Dropping audio chunk while awaiting reply.");
                return;
            }
            TurnState::Speaking => {
                // The client only resumes the microphone once playback is over.
                debug!("Audio received while speaking; treating as playback ended.");
                self.on_playback_ended().await;
            }
            TurnState::Listening => {}
        }
        self.forward_audio(chunk).await;
    }

    async fn on_text(&mut self, text: String) {
        if text.trim().is_empty() {
            debug!("Ignoring blank text message.");
            return;
        }
        info!(%text, "Text message received.");
        if self.state != TurnState::Listening {
            warn!(state = ?self.state, "Rejecting text message outside of Listening.");
            self.client
                .emit(ServerMessage::Error {
                    message: BUSY_NOTICE.to_string(),
                })
                .await;
            return;
        }
        self.begin_turn(text).await;
    }

    async fn on_playback_ended(&mut self) {
        if !self.advance(TurnEvent::PlaybackEnded).await {
            return;
        }
        self.finish_playback().await;
    }

    async fn on_reconnect_requested(&mut self) {
        let state = self.transcription.as_ref().map(|c| c.state());
        if state == Some(ConnectionState::Connecting) {
            debug!("Reconnect requested while already connecting; ignoring.");
            return;
        }
        self.open_transcription();
        self.client.emit(ServerMessage::Reconnecting).await;
    }

    // --- Transcription connection lifecycle ---

    async fn forward_audio(&mut self, chunk: Bytes) {
        match self.transcription.as_ref().map(|c| c.state()) {
            Some(ConnectionState::Open) => self.send_chunk(chunk),
            None | Some(ConnectionState::Closed) => {
                if self.retry_pending() {
                    debug!("Reconnect already in flight; dropping audio chunk.");
                    return;
                }
                info!("Transcription connection closed; reconnecting.");
                self.open_transcription();
                self.client.emit(ServerMessage::Reconnecting).await;
                self.schedule_retry(chunk);
            }
            Some(state) => {
                debug!(?state, "Transcription connection not ready; dropping audio chunk.");
            }
        }
    }

    fn send_chunk(&self, chunk: Bytes) {
        if let Some(connection) = &self.transcription {
            if let Err(e) = connection.send(chunk) {
                warn!(error = %e, "Failed to forward audio chunk; dropping it.");
            }
        }
    }

    /// Opens a new connection, replacing (not draining) the previous one.
    fn open_transcription(&mut self) {
        if let Some(previous) = self.transcription.take() {
            previous.close();
        }
        self.generation += 1;
        let generation = self.generation;
        let events_tx = self.events_tx.clone();
        let callback: TranscriptionCallback = std::sync::Arc::new(move |event| {
            let event = SessionEvent::Transcription { generation, event };
            if let Err(mpsc::error::TrySendError::Full(event)) = events_tx.try_send(event) {
                warn!(?event, "Session event queue full; dropping transcription event.");
            }
        });
        self.transcription = Some(self.services.transcription.open(callback));
    }

    fn retry_pending(&self) -> bool {
        self.retry.is_some()
    }

    fn schedule_retry(&mut self, chunk: Bytes) {
        self.retry_seq += 1;
        let id = self.retry_seq;
        let delay = self.services.reconnect_retry_delay;
        let events_tx = self.events_tx.clone();
        let timer = tokio::spawn(
            async move {
                tokio::time::sleep(delay).await;
                let _ = events_tx.send(SessionEvent::RetryChunk { id, chunk }).await;
            }
            .in_current_span(),
        );
        self.retry = Some(PendingRetry { id, timer });
    }

    fn on_retry(&mut self, id: u64, chunk: Bytes) {
        if self.retry.as_ref().map(|pending| pending.id) != Some(id) {
            debug!(id, "Ignoring retry that is no longer pending.");
            return;
        }
        self.retry = None;
        match self.transcription.as_ref().map(|c| c.state()) {
            Some(ConnectionState::Open) => {
                self.send_chunk(chunk);
                info!("Audio chunk sent after reconnection.");
            }
            state => warn!(?state, "Failed to reconnect in time; dropping audio chunk."),
        }
    }

    async fn on_transcription(&mut self, generation: u64, event: TranscriptionEvent) {
        if generation != self.generation {
            debug!(generation, current = self.generation, "Ignoring event from a replaced connection.");
            return;
        }
        match event {
            TranscriptionEvent::Fragment(fragment) => {
                if fragment.text.is_empty() {
                    return;
                }
                if !fragment.is_final {
                    self.client
                        .emit(ServerMessage::Transcript {
                            text: fragment.text,
                        })
                        .await;
                } else if self.state == TurnState::Listening {
                    info!(text = %fragment.text, "Final transcript received.");
                    self.begin_turn(fragment.text).await;
                } else {
                    warn!(state = ?self.state, text = %fragment.text, "Dropping final transcript outside of Listening.");
                }
            }
            TranscriptionEvent::Closed => {
                info!(generation, "Transcription connection closed by provider.");
            }
        }
    }

    // --- Turn pipeline ---

    async fn begin_turn(&mut self, text: String) {
        if !self.advance(TurnEvent::UtteranceFinalized).await {
            return;
        }
        self.turn += 1;
        self.client
            .emit(ServerMessage::FinalTranscript { text: text.clone() })
            .await;
        self.record.lock().await.messages.push(Message::user(text.clone()));

        let turn = self.turn;
        let completion = self.services.completion.clone();
        let events_tx = self.events_tx.clone();
        tokio::spawn(
            async move {
                let result = completion.complete(&text).await;
                let _ = events_tx.send(SessionEvent::Completion { turn, result }).await;
            }
            .in_current_span(),
        );
    }

    async fn on_completion(&mut self, turn: u64, result: Result<String, ProviderError>) {
        if !self.is_current(turn) {
            return;
        }
        let reply = match result {
            Ok(reply) => reply,
            Err(e) => {
                error!(error = %e, "Completion call failed.");
                self.fail_turn().await;
                return;
            }
        };
        if !self.advance(TurnEvent::ReplyGenerated).await {
            return;
        }
        info!(%reply, "AI response received.");
        self.client
            .emit(ServerMessage::AiResponse {
                text: reply.clone(),
            })
            .await;
        self.record
            .lock()
            .await
            .messages
            .push(Message::assistant(reply.clone()));

        let synthesis = self.services.synthesis.clone();
        let events_tx = self.events_tx.clone();
        tokio::spawn(
            async move {
                let result = synthesis.synthesize(&reply).await;
                let _ = events_tx.send(SessionEvent::Synthesis { turn, result }).await;
            }
            .in_current_span(),
        );
    }

    async fn on_synthesis(&mut self, turn: u64, result: Result<Vec<u8>, ProviderError>) {
        if !self.is_current(turn) {
            return;
        }
        match result {
            Ok(audio) => {
                if !self.advance(TurnEvent::SpeechDelivered).await {
                    return;
                }
                let bytes = audio.len();
                let data = base64::engine::general_purpose::STANDARD.encode(audio);
                self.client.emit(ServerMessage::AudioData { data }).await;
                info!(bytes, "Sent audio data to client.");
            }
            Err(e) => {
                error!(error = %e, "Speech synthesis failed.");
                self.finish_playback().await;
                self.fail_turn().await;
            }
        }
    }

    /// Only results for the turn in flight are accepted.
    fn is_current(&self, turn: u64) -> bool {
        if turn != self.turn || self.state != TurnState::AwaitingReply {
            debug!(turn, current = self.turn, state = ?self.state, "Discarding stale provider result.");
            return false;
        }
        true
    }

    async fn fail_turn(&mut self) {
        if self.advance(TurnEvent::ProviderFailed).await {
            self.client
                .emit(ServerMessage::Error {
                    message: PROVIDER_FAILURE_NOTICE.to_string(),
                })
                .await;
        }
    }

    /// Clears the playing flag on assistant messages.
    async fn finish_playback(&self) {
        let mut record = self.record.lock().await;
        for message in record
            .messages
            .iter_mut()
            .filter(|m| m.role == MessageRole::Assistant)
        {
            message.is_audio_playing = Some(false);
        }
    }

    /// Applies a state machine transition. Returns `false` if it was rejected.
    async fn advance(&mut self, event: TurnEvent) -> bool {
        match self.state.next(event) {
            Some(next) => {
                if next != self.state {
                    debug!(from = ?self.state, to = ?next, ?event, "Turn state changed.");
                }
                self.state = next;
                self.record.lock().await.turn_state = next;
                true
            }
            None => {
                warn!(state = ?self.state, ?event, "Ignoring invalid turn transition.");
                false
            }
        }
    }

    async fn teardown(&mut self) {
        self.ended = true;
        if let Some(retry) = self.retry.take() {
            retry.timer.abort();
        }
        if let Some(connection) = self.transcription.take() {
            connection.close();
        }
        self.client.clear();
    }
}
