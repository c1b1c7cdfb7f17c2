//! Repcoach Agent
//!
//! The host-side runtime: loads configuration, opens a realtime voice
//! session (or the line-oriented chat transport in text mode), wires the
//! microphone and speaker pipelines to it, and executes tool calls against
//! an in-memory workout log.

pub mod audio;
pub mod config;
pub mod runtime;
pub mod workout;
