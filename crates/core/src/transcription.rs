//! Transcription Bridge
//!
//! Owns one live streaming connection to the speech-to-text provider. Audio
//! chunks go in through [`TranscriptionConnection::send`]; transcript
//! fragments and the final close notification come back through the
//! [`TranscriptionCallback`] handed to [`TranscriptionProvider::open`].
//!
//! The bridge never reconnects on its own and never buffers audio. Deciding
//! when to open a replacement connection is left to the caller.

use crate::error::TranscriptionError;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::{Notify, mpsc};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        client::IntoClientRequest,
        http::{HeaderValue, header::AUTHORIZATION},
        protocol::Message as WsMessage,
    },
};
use tracing::{Instrument, debug, info, warn};

pub const DEEPGRAM_LISTEN_URL: &str = "wss://api.deepgram.com/v1/listen";

/// Audio chunks buffered between the caller and the socket task.
const AUDIO_QUEUE_DEPTH: usize = 128;

/// Sent before a graceful close so the provider flushes pending results.
const CLOSE_STREAM_MESSAGE: &str = r#"{"type":"CloseStream"}"#;

/// Lifecycle of a single transcription connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Connecting,
            1 => ConnectionState::Open,
            2 => ConnectionState::Closing,
            _ => ConnectionState::Closed,
        }
    }
}

/// A `ConnectionState` that can be read synchronously from any thread.
#[derive(Debug, Clone)]
pub struct SharedConnectionState(Arc<AtomicU8>);

impl SharedConnectionState {
    pub fn new(initial: ConnectionState) -> Self {
        Self(Arc::new(AtomicU8::new(initial as u8)))
    }

    pub fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::SeqCst))
    }

    pub fn set(&self, state: ConnectionState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    /// Moves to `to` only if the current state is `from`.
    pub fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

/// One transcript update from the provider.
///
/// Interim fragments are superseded by the next fragment; a final fragment is
/// never revised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptFragment {
    pub text: String,
    pub is_final: bool,
}

/// Notifications delivered by a live connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptionEvent {
    Fragment(TranscriptFragment),
    /// The connection is gone. Delivered exactly once per connection.
    Closed,
}

/// Receives [`TranscriptionEvent`]s. Invoked from the bridge's own task.
pub type TranscriptionCallback = Arc<dyn Fn(TranscriptionEvent) + Send + Sync>;

/// Handle to a live transcription connection.
pub trait TranscriptionConnection: Send + Sync {
    /// Forwards one audio chunk. Only valid while the state is `Open`.
    fn send(&self, chunk: Bytes) -> Result<(), TranscriptionError>;

    /// Asks the connection to shut down. Idempotent.
    fn close(&self);

    fn state(&self) -> ConnectionState;
}

/// Opens transcription connections.
pub trait TranscriptionProvider: Send + Sync {
    /// Starts a new connection and returns its handle immediately, normally
    /// in the `Connecting` state.
    fn open(&self, callback: TranscriptionCallback) -> Box<dyn TranscriptionConnection>;
}

/// Fixed stream options, set once from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptionOptions {
    pub language: String,
    pub model: String,
    pub punctuate: bool,
    pub smart_format: bool,
    pub interim_results: bool,
    pub endpoint: String,
}

impl Default for TranscriptionOptions {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            model: "nova".to_string(),
            punctuate: true,
            smart_format: true,
            interim_results: true,
            endpoint: DEEPGRAM_LISTEN_URL.to_string(),
        }
    }
}

impl TranscriptionOptions {
    /// Builds the full listen URL including the query parameters.
    pub fn listen_url(&self) -> Result<reqwest::Url, TranscriptionError> {
        reqwest::Url::parse_with_params(
            &self.endpoint,
            &[
                ("language", self.language.as_str()),
                ("model", self.model.as_str()),
                ("punctuate", bool_param(self.punctuate)),
                ("smart_format", bool_param(self.smart_format)),
                ("interim_results", bool_param(self.interim_results)),
            ],
        )
        .map_err(|e| TranscriptionError::Connect(format!("invalid endpoint: {}", e)))
    }
}

fn bool_param(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

// --- Deepgram wire types ---

#[derive(Deserialize, Debug)]
struct DeepgramMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    is_final: bool,
    channel: Option<DeepgramChannel>,
}

#[derive(Deserialize, Debug)]
struct DeepgramChannel {
    alternatives: Vec<DeepgramAlternative>,
}

#[derive(Deserialize, Debug)]
struct DeepgramAlternative {
    #[serde(default)]
    transcript: String,
}

/// Extracts a fragment from a provider text frame. Non-result messages and
/// empty transcripts yield `None`.
pub fn parse_fragment(payload: &str) -> Option<TranscriptFragment> {
    let message: DeepgramMessage = match serde_json::from_str(payload) {
        Ok(message) => message,
        Err(e) => {
            debug!(error = %e, "Ignoring unparseable transcription message.");
            return None;
        }
    };
    if message.kind != "Results" {
        return None;
    }
    let text = message
        .channel?
        .alternatives
        .into_iter()
        .next()
        .map(|alt| alt.transcript)?;
    if text.is_empty() {
        return None;
    }
    Some(TranscriptFragment {
        text,
        is_final: message.is_final,
    })
}

// --- Deepgram bridge ---

/// Opens live streaming connections to Deepgram.
pub struct DeepgramTranscriber {
    api_key: String,
    options: TranscriptionOptions,
}

impl DeepgramTranscriber {
    pub fn new(api_key: String, options: TranscriptionOptions) -> Self {
        Self { api_key, options }
    }
}

impl TranscriptionProvider for DeepgramTranscriber {
    fn open(&self, callback: TranscriptionCallback) -> Box<dyn TranscriptionConnection> {
        let state = SharedConnectionState::new(ConnectionState::Connecting);
        let (audio_tx, audio_rx) = mpsc::channel(AUDIO_QUEUE_DEPTH);
        let finish = Arc::new(Notify::new());
        info!(
            language = %self.options.language,
            model = %self.options.model,
            "Opening transcription connection."
        );

        tokio::spawn(
            run_connection(
                self.options.clone(),
                self.api_key.clone(),
                state.clone(),
                audio_rx,
                finish.clone(),
                callback,
            )
            .in_current_span(),
        );

        Box::new(DeepgramConnection {
            state,
            audio: audio_tx,
            finish,
        })
    }
}

/// Handle returned by [`DeepgramTranscriber::open`].
pub struct DeepgramConnection {
    state: SharedConnectionState,
    audio: mpsc::Sender<Bytes>,
    finish: Arc<Notify>,
}

impl TranscriptionConnection for DeepgramConnection {
    fn send(&self, chunk: Bytes) -> Result<(), TranscriptionError> {
        let state = self.state.get();
        if state != ConnectionState::Open {
            return Err(TranscriptionError::NotOpen(state));
        }
        self.audio.try_send(chunk).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => TranscriptionError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => TranscriptionError::ChannelClosed,
        })
    }

    fn close(&self) {
        if self
            .state
            .transition(ConnectionState::Connecting, ConnectionState::Closing)
            || self
                .state
                .transition(ConnectionState::Open, ConnectionState::Closing)
        {
            self.finish.notify_one();
        }
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }
}

/// Drives one connection from connect to close, then reports `Closed` once.
async fn run_connection(
    options: TranscriptionOptions,
    api_key: String,
    state: SharedConnectionState,
    audio: mpsc::Receiver<Bytes>,
    finish: Arc<Notify>,
    callback: TranscriptionCallback,
) {
    match stream_audio(&options, &api_key, &state, audio, &finish, &callback).await {
        Ok(()) => info!("Transcription connection closed."),
        Err(e) => warn!(error = %e, "Transcription connection failed."),
    }
    state.set(ConnectionState::Closed);
    callback(TranscriptionEvent::Closed);
}

async fn stream_audio(
    options: &TranscriptionOptions,
    api_key: &str,
    state: &SharedConnectionState,
    mut audio: mpsc::Receiver<Bytes>,
    finish: &Notify,
    callback: &TranscriptionCallback,
) -> Result<(), TranscriptionError> {
    let url = options.listen_url()?;
    let mut request = url
        .as_str()
        .into_client_request()
        .map_err(|e| TranscriptionError::Connect(e.to_string()))?;
    let auth = HeaderValue::from_str(&format!("Token {}", api_key))
        .map_err(|e| TranscriptionError::Connect(e.to_string()))?;
    request.headers_mut().insert(AUTHORIZATION, auth);

    let (ws_stream, _) = connect_async(request)
        .await
        .map_err(|e| TranscriptionError::Connect(e.to_string()))?;

    if !state.transition(ConnectionState::Connecting, ConnectionState::Open) {
        info!("Transcription connection was closed while connecting; discarding socket.");
        return Ok(());
    }
    info!("Transcription connection open.");

    let (mut provider_tx, mut provider_rx) = ws_stream.split();
    loop {
        // Queued audio is flushed before a requested close takes effect.
        let finished = tokio::select! {
            biased;
            chunk = audio.recv() => match chunk {
                Some(chunk) => {
                    provider_tx
                        .send(WsMessage::Binary(chunk))
                        .await
                        .map_err(|e| TranscriptionError::Stream(e.to_string()))?;
                    false
                }
                None => true,
            },
            incoming = provider_rx.next() => match incoming {
                Some(Ok(WsMessage::Text(text))) => {
                    if let Some(fragment) = parse_fragment(text.as_str()) {
                        callback(TranscriptionEvent::Fragment(fragment));
                    }
                    false
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    info!(?frame, "Transcription provider closed the connection.");
                    return Ok(());
                }
                Some(Ok(_)) => false,
                Some(Err(e)) => return Err(TranscriptionError::Stream(e.to_string())),
                None => return Ok(()),
            },
            _ = finish.notified() => true,
        };
        if finished {
            state.set(ConnectionState::Closing);
            let _ = provider_tx.send(WsMessage::Text(CLOSE_STREAM_MESSAGE.into())).await;
            let _ = provider_tx.close().await;
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_final_result() {
        let payload = r#"{
            "type": "Results",
            "is_final": true,
            "channel": { "alternatives": [{ "transcript": "how are you", "confidence": 0.98 }] }
        }"#;
        assert_eq!(
            parse_fragment(payload),
            Some(TranscriptFragment {
                text: "how are you".to_string(),
                is_final: true
            })
        );
    }

    #[test]
    fn test_parse_interim_result() {
        let payload = r#"{"type":"Results","is_final":false,"channel":{"alternatives":[{"transcript":"how"}]}}"#;
        let fragment = parse_fragment(payload).unwrap();
        assert_eq!(fragment.text, "how");
        assert!(!fragment.is_final);
    }

    #[test]
    fn test_parse_ignores_other_messages() {
        assert_eq!(parse_fragment(r#"{"type":"Metadata","request_id":"x"}"#), None);
        assert_eq!(
            parse_fragment(
                r#"{"type":"Results","is_final":true,"channel":{"alternatives":[{"transcript":""}]}}"#
            ),
            None
        );
        assert_eq!(
            parse_fragment(r#"{"type":"Results","channel":{"alternatives":[]}}"#),
            None
        );
        assert_eq!(parse_fragment("not json"), None);
    }

    #[test]
    fn test_listen_url_carries_fixed_options() {
        let url = TranscriptionOptions::default().listen_url().unwrap();
        assert_eq!(url.scheme(), "wss");
        assert_eq!(url.host_str(), Some("api.deepgram.com"));
        let query = url.query().unwrap();
        assert!(query.contains("language=en"));
        assert!(query.contains("model=nova"));
        assert!(query.contains("punctuate=true"));
        assert!(query.contains("smart_format=true"));
        assert!(query.contains("interim_results=true"));
    }

    #[test]
    fn test_listen_url_rejects_bad_endpoint() {
        let options = TranscriptionOptions {
            endpoint: "not a url".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            options.listen_url(),
            Err(TranscriptionError::Connect(_))
        ));
    }

    #[test]
    fn test_shared_state_transition() {
        let state = SharedConnectionState::new(ConnectionState::Connecting);
        assert!(!state.transition(ConnectionState::Open, ConnectionState::Closing));
        assert!(state.transition(ConnectionState::Connecting, ConnectionState::Open));
        assert_eq!(state.get(), ConnectionState::Open);
        state.set(ConnectionState::Closed);
        assert_eq!(state.get(), ConnectionState::Closed);
    }

    fn test_connection(
        state: ConnectionState,
        depth: usize,
    ) -> (DeepgramConnection, mpsc::Receiver<Bytes>, Arc<Notify>) {
        let (audio, rx) = mpsc::channel(depth);
        let finish = Arc::new(Notify::new());
        let connection = DeepgramConnection {
            state: SharedConnectionState::new(state),
            audio,
            finish: finish.clone(),
        };
        (connection, rx, finish)
    }

    #[tokio::test]
    async fn test_send_before_open_is_rejected() {
        let (connection, mut rx, _finish) = test_connection(ConnectionState::Connecting, 4);
        let err = connection.send(Bytes::from_static(b"abc")).unwrap_err();
        assert!(matches!(
            err,
            TranscriptionError::NotOpen(ConnectionState::Connecting)
        ));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_close_moves_to_closing_once() {
        let (connection, mut rx, finish) = test_connection(ConnectionState::Open, 4);
        connection.send(Bytes::from_static(b"abc")).unwrap();
        connection.close();
        connection.close();
        assert_eq!(connection.state(), ConnectionState::Closing);
        assert!(matches!(
            connection.send(Bytes::from_static(b"def")),
            Err(TranscriptionError::NotOpen(ConnectionState::Closing))
        ));

        assert_eq!(rx.try_recv().unwrap(), Bytes::from_static(b"abc"));
        assert!(rx.try_recv().is_err());

        let wait = std::time::Duration::from_millis(50);
        assert!(tokio::time::timeout(wait, finish.notified()).await.is_ok());
        assert!(tokio::time::timeout(wait, finish.notified()).await.is_err());
    }

    #[tokio::test]
    async fn test_send_drops_when_queue_is_full() {
        let (connection, mut rx, _finish) = test_connection(ConnectionState::Open, 1);
        connection.send(Bytes::from_static(b"one")).unwrap();
        assert!(matches!(
            connection.send(Bytes::from_static(b"two")),
            Err(TranscriptionError::QueueFull)
        ));

        assert_eq!(rx.try_recv().unwrap(), Bytes::from_static(b"one"));
        drop(rx);
        assert!(matches!(
            connection.send(Bytes::from_static(b"three")),
            Err(TranscriptionError::ChannelClosed)
        ));
    }

    #[tokio::test]
    async fn test_unreachable_provider_reports_closed_once() {
        let options = TranscriptionOptions {
            endpoint: "ws://127.0.0.1:9/v1/listen".to_string(),
            ..Default::default()
        };
        let (events_tx, mut events_rx) = mpsc::channel(4);
        let callback: TranscriptionCallback = Arc::new(move |event| {
            let _ = events_tx.try_send(event);
        });

        let connection = DeepgramTranscriber::new("key".into(), options).open(callback);
        let event = tokio::time::timeout(std::time::Duration::from_secs(10), events_rx.recv())
            .await
            .expect("closed notification")
            .expect("channel open");
        assert_eq!(event, TranscriptionEvent::Closed);
        assert_eq!(connection.state(), ConnectionState::Closed);
        assert!(events_rx.try_recv().is_err());
    }
}
