//! The turn-taking state machine.

use crate::models::TurnState;

/// Inputs that can move a session between turn states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnEvent {
    /// A final transcript or typed message was accepted.
    UtteranceFinalized,
    /// The completion call returned reply text.
    ReplyGenerated,
    /// The synthesis call returned audio, which was sent to the client.
    SpeechDelivered,
    /// The client finished playing the assistant's audio.
    PlaybackEnded,
    /// The completion or synthesis call failed.
    ProviderFailed,
}

impl TurnState {
    /// Returns the state reached by applying `event`, or `None` if the event
    /// is not valid in the current state.
    pub fn next(self, event: TurnEvent) -> Option<TurnState> {
        use TurnEvent::*;
        use TurnState::*;

        match (self, event) {
            (Listening, UtteranceFinalized) => Some(AwaitingReply),
            (AwaitingReply, ReplyGenerated) => Some(AwaitingReply),
            (AwaitingReply, SpeechDelivered) => Some(Speaking),
            (Speaking, PlaybackEnded) => Some(Listening),
            (AwaitingReply | Speaking, ProviderFailed) => Some(Listening),
            _ => None,
        }
    }
}
