//! WebSocket Session Management
//!
//! This module contains the core logic for handling live voice sessions
//! over WebSockets. It is structured into submodules for clarity:
//!
//! - `protocol`: Defines the JSON-based message format for client-server communication.
//! - `session`: Manages the WebSocket connection lifecycle, from handshake to termination.
//! - `orchestrator`: Drives each session's turns: transcription, completion and synthesis.
//! - `turn`: The turn-taking state machine.
//! - `channel`: The outbound event channel to one client.
//! - `registry`: Tracks every connected session by id.

pub mod channel;
pub mod orchestrator;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod turn;

pub use session::ws_handler;
