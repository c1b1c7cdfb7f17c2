//! Transition rules from server events to the observable session state.
//!
//! Kept as a pure function so the guards are testable without a socket.
//! Returning `None` means the event does not move the state; in particular
//! a `response.done` arriving while already Listening is a no-op rather
//! than an illegal transition.

use crate::types::ServerEvent;
use repcoach_core::AgentState;

pub fn next_state(current: &AgentState, event: &ServerEvent) -> Option<AgentState> {
    match event {
        ServerEvent::SessionCreated {} => match current {
            AgentState::Connecting => Some(AgentState::Listening),
            _ => None,
        },
        // End of the user's turn: the upstream is now working.
        ServerEvent::SpeechStopped {} => match current {
            AgentState::Listening => Some(AgentState::Thinking),
            _ => None,
        },
        // First inbound audio/text of a response.
        ServerEvent::AudioDelta { .. } | ServerEvent::AudioTranscriptDelta { .. } => {
            match current {
                AgentState::Listening | AgentState::Thinking => Some(AgentState::Speaking),
                _ => None,
            }
        }
        // A completed tool call is about to be dispatched.
        ServerEvent::FunctionCallArgumentsDone { .. } => match current {
            AgentState::Listening | AgentState::Speaking => Some(AgentState::Thinking),
            _ => None,
        },
        ServerEvent::ResponseDone {} => match current {
            AgentState::Speaking | AgentState::Thinking => Some(AgentState::Listening),
            _ => None,
        },
        ServerEvent::Error { error } => Some(AgentState::Error {
            message: error.message.clone(),
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ErrorDetail;

    #[test]
    fn session_created_completes_the_handshake() {
        assert_eq!(
            next_state(&AgentState::Connecting, &ServerEvent::SessionCreated {}),
            Some(AgentState::Listening)
        );
    }

    #[test]
    fn speech_stopped_enters_thinking() {
        assert_eq!(
            next_state(&AgentState::Listening, &ServerEvent::SpeechStopped {}),
            Some(AgentState::Thinking)
        );
    }

    #[test]
    fn first_response_delta_enters_speaking() {
        let delta = ServerEvent::AudioTranscriptDelta { delta: "On".to_string() };
        assert_eq!(
            next_state(&AgentState::Thinking, &delta),
            Some(AgentState::Speaking)
        );
        // Already speaking: no churn on every subsequent delta.
        assert_eq!(next_state(&AgentState::Speaking, &delta), None);
    }

    #[test]
    fn response_done_returns_to_listening() {
        assert_eq!(
            next_state(&AgentState::Speaking, &ServerEvent::ResponseDone {}),
            Some(AgentState::Listening)
        );
    }

    #[test]
    fn response_done_without_prior_speech_leaves_listening_alone() {
        assert_eq!(
            next_state(&AgentState::Listening, &ServerEvent::ResponseDone {}),
            None
        );
    }

    #[test]
    fn upstream_error_is_terminal_from_any_state() {
        let error = ServerEvent::Error {
            error: ErrorDetail { message: "server hiccup".to_string() },
        };
        for state in [
            AgentState::Connecting,
            AgentState::Listening,
            AgentState::Thinking,
            AgentState::Speaking,
        ] {
            assert_eq!(
                next_state(&state, &error),
                Some(AgentState::Error { message: "server hiccup".to_string() })
            );
        }
    }

    #[test]
    fn unknown_events_never_move_the_state() {
        assert_eq!(next_state(&AgentState::Listening, &ServerEvent::Unknown), None);
        assert_eq!(next_state(&AgentState::Speaking, &ServerEvent::Unknown), None);
    }
}
