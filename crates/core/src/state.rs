//! The externally observable state of an agent session.

use serde::{Deserialize, Serialize};

/// What the session is doing right now, as seen by the UI.
///
/// Transitions happen only inside the session manager; consumers watch the
/// published value and never mutate it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AgentState {
    /// No connection. The initial state, and the only exit from `Error`.
    Idle,
    /// Transport handshake in progress.
    Connecting,
    /// Connected and accepting microphone input.
    Listening,
    /// The upstream is working: the user's turn ended or a tool call is in
    /// flight.
    Thinking,
    /// Response audio/text is streaming in.
    Speaking,
    /// The connection failed. Cleared only by an explicit disconnect.
    Error { message: String },
}

impl AgentState {
    /// True while a live transport exists.
    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            AgentState::Listening | AgentState::Thinking | AgentState::Speaking
        )
    }
}
