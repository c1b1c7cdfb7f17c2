//! Repcoach Realtime
//!
//! The duplex speech transport: a WebSocket client that streams microphone
//! audio up, receives synthesized audio and partial transcripts back, and
//! reassembles tool calls from incremental argument fragments. One
//! [`session::RealtimeSession`] drives one connection; its inbound handling
//! is serialized onto a single task.

pub mod outbound;
pub mod session;
pub mod state;
pub mod types;

pub use session::{ConnectError, RealtimeConfig, RealtimeSession, SessionEvents, TranscriptEvent};
pub use types::AudioFrame;
