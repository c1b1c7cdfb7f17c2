//! Repcoach Core
//!
//! Transport-independent logic for the voice workout coach: the generic
//! value type that tool arguments and results travel through, the streaming
//! delta aggregator that reassembles tool calls from fragments, the tool
//! registry and dispatcher, and the line-oriented chat client. The duplex
//! speech transport lives in `repcoach-realtime`; this crate knows nothing
//! about sockets or audio devices.

pub mod aggregator;
pub mod chat;
pub mod state;
pub mod tools;
pub mod value;

pub use state::AgentState;
pub use tools::{ToolCall, ToolResult};
pub use value::Value;
