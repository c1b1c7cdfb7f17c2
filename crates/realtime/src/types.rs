//! Wire-format types for the duplex speech transport.
//!
//! Both directions are JSON text frames discriminated by a `type` tag.
//! Only the events this client acts on are modeled; anything else
//! deserializes into [`ServerEvent::Unknown`] and is skipped, so an
//! upstream protocol addition can never take the session down.

use repcoach_core::tools::ToolSchema;
use serde::{Deserialize, Serialize};

/// PCM16 session audio: 24 kHz, mono, little-endian.
pub const SESSION_SAMPLE_RATE: u32 = 24_000;

/// One block of session-format audio plus its sample count.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    /// Little-endian PCM16 bytes.
    pub pcm: Vec<u8>,
    /// Number of samples encoded in `pcm`.
    pub samples: usize,
}

impl AudioFrame {
    pub fn from_samples(samples: &[i16]) -> Self {
        let pcm = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        Self { pcm, samples: samples.len() }
    }

    pub fn to_samples(&self) -> Vec<i16> {
        self.pcm
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect()
    }
}

// ---- Client -> server ----

/// Session parameters negotiated via `session.update`.
#[derive(Debug, Clone, Serialize)]
pub struct SessionParams {
    pub modalities: Vec<String>,
    pub instructions: String,
    pub voice: String,
    pub input_audio_format: String,
    pub output_audio_format: String,
    pub tools: Vec<RealtimeTool>,
}

/// A declared tool in the realtime session shape: the schema flattened next
/// to a `type: "function"` marker.
#[derive(Debug, Clone, Serialize)]
pub struct RealtimeTool {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(flatten)]
    pub schema: ToolSchema,
}

impl From<ToolSchema> for RealtimeTool {
    fn from(schema: ToolSchema) -> Self {
        Self { kind: "function", schema }
    }
}

/// An item appended to the conversation; this client only ever creates
/// function-call outputs.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationItem {
    #[serde(rename = "type")]
    kind: &'static str,
    pub call_id: String,
    pub output: String,
}

impl ConversationItem {
    pub fn function_call_output(call_id: String, output: String) -> Self {
        Self { kind: "function_call_output", call_id, output }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionParams },
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend { audio: String },
    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate { item: ConversationItem },
    #[serde(rename = "response.create")]
    ResponseCreate {},
}

// ---- Server -> client ----

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorDetail {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "session.created")]
    SessionCreated {},
    #[serde(rename = "session.updated")]
    SessionUpdated {},
    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted {},
    #[serde(rename = "input_audio_buffer.speech_stopped")]
    SpeechStopped {},
    #[serde(rename = "response.audio_transcript.delta")]
    AudioTranscriptDelta { delta: String },
    #[serde(rename = "response.audio_transcript.done")]
    AudioTranscriptDone { transcript: String },
    #[serde(rename = "response.audio.delta")]
    AudioDelta { delta: String },
    #[serde(rename = "response.function_call_arguments.delta")]
    FunctionCallArgumentsDelta {
        call_id: Option<String>,
        output_index: Option<u32>,
        delta: String,
    },
    #[serde(rename = "response.function_call_arguments.done")]
    FunctionCallArgumentsDone {
        call_id: String,
        output_index: Option<u32>,
        name: Option<String>,
        #[serde(default)]
        arguments: String,
    },
    #[serde(rename = "response.done")]
    ResponseDone {},
    #[serde(rename = "error")]
    Error { error: ErrorDetail },
    /// Any event tag this client does not handle.
    #[serde(other)]
    Unknown,
}
