//! The device-facing audio pipelines: microphone capture in, speaker
//! playback out, and the sample-format conversion between the devices'
//! native formats and the session format (24 kHz mono PCM16).

pub mod capture;
pub mod codec;
pub mod playback;

pub use capture::{AudioCapture, CapturedBlock};
pub use codec::SessionFormatConverter;
pub use playback::AudioPlayback;

/// A device-level failure. Audio is an optional facility: callers log these
/// and keep the session running without the affected pipeline.
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("no audio device available: {0}")]
    NoDevice(String),
    #[error("audio device rejected its configuration: {0}")]
    Config(String),
    #[error("audio stream failed: {0}")]
    Stream(String),
}
