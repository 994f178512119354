//! VoiceGPT API Library Crate
//!
//! This library contains all the logic for the voice assistant web service:
//! configuration, application state, the live WebSocket sessions, the REST
//! handlers and routing. The `api` binary is a thin wrapper around it.

pub mod config;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;
pub mod ws;
