//! The session manager: owns one duplex connection end to end.
//!
//! `connect` performs the handshake and spawns a task that holds both halves
//! of the WebSocket. Every inbound frame is handled on that task, in order;
//! the rest of the application talks to it through a command channel and
//! listens on the event channels it hands back. There is no reconnect
//! policy: a lost transport surfaces as `Error` state and stays there until
//! the caller disconnects and connects again.

use crate::outbound::OutboundAudioBuffer;
use crate::state::next_state;
use crate::types::{
    AudioFrame, ClientEvent, ConversationItem, RealtimeTool, ServerEvent, SessionParams,
};
use anyhow::Result;
use base64::Engine;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use repcoach_core::aggregator::{DeltaAggregator, ToolCallFragment};
use repcoach_core::tools::{ToolCall, ToolResult, ToolSchema};
use repcoach_core::AgentState;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, info, warn};

const DEFAULT_URL: &str = "wss://api.openai.com/v1/realtime";

/// What `connect` needs to open and configure a session.
#[derive(Clone)]
pub struct RealtimeConfig {
    pub api_key: Option<SecretString>,
    pub url: String,
    pub model: String,
    pub voice: String,
    pub instructions: String,
    pub tools: Vec<ToolSchema>,
    /// Outbound batch size threshold, in PCM bytes.
    pub flush_bytes: usize,
    /// Outbound batch age threshold.
    pub flush_interval: Duration,
}

impl RealtimeConfig {
    pub fn new(api_key: Option<SecretString>, model: impl Into<String>) -> Self {
        Self {
            api_key,
            url: DEFAULT_URL.to_string(),
            model: model.into(),
            voice: "alloy".to_string(),
            instructions: String::new(),
            tools: Vec::new(),
            // ~100ms of 24kHz PCM16, batched at most 150ms.
            flush_bytes: 4800,
            flush_interval: Duration::from_millis(150),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("no API credential configured")]
    MissingCredential,
    #[error("transport handshake failed: {0}")]
    Transport(String),
}

/// A partial or final piece of transcript text.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptEvent {
    pub text: String,
    pub is_final: bool,
}

/// The event channels a session pushes to its owner. Explicit queues, not
/// callbacks: the consumer decides where and when to drain them.
pub struct SessionEvents {
    /// Partial and final transcript text of the agent's speech.
    pub transcripts: mpsc::Receiver<TranscriptEvent>,
    /// Tool calls frozen by the aggregator, ready for dispatch.
    pub tool_calls: mpsc::Receiver<ToolCall>,
    /// Decoded inbound audio, in arrival order, for playback.
    pub audio: mpsc::Receiver<AudioFrame>,
    /// Microphone level samples in [0, 1] for UI metering.
    pub levels: mpsc::Receiver<f32>,
    /// The observable session state.
    pub state: watch::Receiver<AgentState>,
}

enum Command {
    Audio { frame: AudioFrame, level: f32 },
    ToolResult { id: String, result: ToolResult },
    ToggleListening,
    SetListening(bool),
    Close,
}

/// Handle to a live (or finished) session. Cheap to clone.
#[derive(Clone)]
pub struct RealtimeSession {
    commands: mpsc::Sender<Command>,
    state_tx: Arc<watch::Sender<AgentState>>,
    state_rx: watch::Receiver<AgentState>,
}

impl RealtimeSession {
    /// Open the transport, configure the session, and start the event loop.
    pub async fn connect(config: RealtimeConfig) -> Result<(Self, SessionEvents), ConnectError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or(ConnectError::MissingCredential)?;

        let url = format!("{}?model={}", config.url, config.model);
        let mut request = url
            .into_client_request()
            .map_err(|e| ConnectError::Transport(e.to_string()))?;
        let bearer = format!("Bearer {}", api_key.expose_secret())
            .parse()
            .map_err(|_| ConnectError::Transport("credential is not header-safe".to_string()))?;
        request.headers_mut().insert("Authorization", bearer);
        request.headers_mut().insert(
            "OpenAI-Beta",
            "realtime=v1".parse().expect("static header value"),
        );

        let (ws_stream, _) = connect_async(request)
            .await
            .map_err(|e| ConnectError::Transport(e.to_string()))?;
        info!(model = %config.model, "realtime transport connected");

        let (state_tx, state_rx) = watch::channel(AgentState::Connecting);
        let state_tx = Arc::new(state_tx);
        let (commands_tx, commands_rx) = mpsc::channel(256);
        let (transcripts_tx, transcripts_rx) = mpsc::channel(64);
        let (tool_calls_tx, tool_calls_rx) = mpsc::channel(16);
        let (audio_tx, audio_rx) = mpsc::channel(256);
        let (levels_tx, levels_rx) = mpsc::channel(64);

        let task = SessionTask {
            config,
            state: state_tx.clone(),
            transcripts: transcripts_tx,
            tool_calls: tool_calls_tx,
            audio: audio_tx,
            levels: levels_tx,
            aggregator: DeltaAggregator::new(),
            listening: true,
        };
        tokio::spawn(task.run(ws_stream, commands_rx));

        let session = Self {
            commands: commands_tx,
            state_tx,
            state_rx: state_rx.clone(),
        };
        let events = SessionEvents {
            transcripts: transcripts_rx,
            tool_calls: tool_calls_rx,
            audio: audio_rx,
            levels: levels_rx,
            state: state_rx,
        };
        Ok((session, events))
    }

    pub fn current_state(&self) -> AgentState {
        self.state_rx.borrow().clone()
    }

    /// Hand a captured frame (and its level metric) to the session. Dropped
    /// silently once the session is gone.
    pub async fn send_audio(&self, frame: AudioFrame, level: f32) {
        let _ = self.commands.send(Command::Audio { frame, level }).await;
    }

    /// Relay a tool result upstream, tagged with the originating call id.
    /// A result arriving after disconnect lands on a closed channel and is
    /// dropped.
    pub async fn send_tool_result(&self, id: String, result: ToolResult) {
        let _ = self.commands.send(Command::ToolResult { id, result }).await;
    }

    /// Pause or resume outbound audio without touching the transport.
    pub async fn toggle_listening(&self) {
        let _ = self.commands.send(Command::ToggleListening).await;
    }

    /// Set the listening flag explicitly.
    pub async fn set_listening(&self, listening: bool) {
        let _ = self.commands.send(Command::SetListening(listening)).await;
    }

    /// Tear the session down. Idempotent and safe from any state, including
    /// after a transport error: the state always ends at `Idle`.
    pub async fn disconnect(&self) {
        let _ = self.commands.send(Command::Close).await;
        let _ = self.state_tx.send(AgentState::Idle);
    }
}

struct SessionTask {
    config: RealtimeConfig,
    state: Arc<watch::Sender<AgentState>>,
    transcripts: mpsc::Sender<TranscriptEvent>,
    tool_calls: mpsc::Sender<ToolCall>,
    audio: mpsc::Sender<AudioFrame>,
    levels: mpsc::Sender<f32>,
    aggregator: DeltaAggregator,
    listening: bool,
}

impl SessionTask {
    async fn run<S>(mut self, ws_stream: S, mut commands: mpsc::Receiver<Command>)
    where
        S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
            + Sink<Message>
            + Unpin,
        <S as Sink<Message>>::Error: std::fmt::Display,
    {
        let (mut ws_tx, mut ws_rx) = ws_stream.split();
        let mut outbound =
            OutboundAudioBuffer::new(self.config.flush_bytes, self.config.flush_interval);
        let mut flush_tick = tokio::time::interval(self.config.flush_interval / 2);
        flush_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                command = commands.recv() => {
                    match command {
                        None | Some(Command::Close) => {
                            debug!("session closing");
                            let _ = ws_tx.send(Message::Close(None)).await;
                            self.publish(AgentState::Idle);
                            break;
                        }
                        Some(Command::Audio { frame, level }) => {
                            if !self.listening {
                                continue;
                            }
                            let _ = self.levels.try_send(level);
                            if let Some(batch) = outbound.append(&frame.pcm, Instant::now()) {
                                if self.send_batch(&mut ws_tx, batch).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Some(Command::ToolResult { id, result }) => {
                            if self.relay_tool_result(&mut ws_tx, id, result).await.is_err() {
                                break;
                            }
                        }
                        Some(Command::ToggleListening) => {
                            self.listening = !self.listening;
                            info!(listening = self.listening, "capture toggled");
                        }
                        Some(Command::SetListening(listening)) => {
                            self.listening = listening;
                            info!(listening, "capture toggled");
                        }
                    }
                }
                _ = flush_tick.tick() => {
                    if let Some(batch) = outbound.poll(Instant::now()) {
                        if self.send_batch(&mut ws_tx, batch).await.is_err() {
                            break;
                        }
                    }
                }
                inbound = ws_rx.next() => {
                    match inbound {
                        Some(Ok(Message::Text(text))) => {
                            if self.handle_frame(&mut ws_tx, &text).await.is_err() {
                                break;
                            }
                            if matches!(*self.state.borrow(), AgentState::Error { .. }) {
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            self.publish(AgentState::Error {
                                message: "connection closed by upstream".to_string(),
                            });
                            break;
                        }
                        Some(Ok(_)) => {} // binary/ping/pong: nothing to do
                        Some(Err(e)) => {
                            self.publish(AgentState::Error { message: e.to_string() });
                            break;
                        }
                    }
                }
            }
        }
        info!("session task finished");
    }

    fn publish(&self, state: AgentState) {
        // A late error must not resurrect a session the caller already
        // reset to Idle.
        if matches!(*self.state.borrow(), AgentState::Idle)
            && matches!(state, AgentState::Error { .. })
        {
            return;
        }
        let _ = self.state.send(state);
    }

    async fn send_event<T>(&self, ws_tx: &mut T, event: &ClientEvent) -> Result<()>
    where
        T: Sink<Message> + Unpin,
        <T as Sink<Message>>::Error: std::fmt::Display,
    {
        let serialized = serde_json::to_string(event)?;
        ws_tx.send(Message::Text(serialized.into())).await.map_err(|e| {
            self.publish(AgentState::Error { message: e.to_string() });
            anyhow::anyhow!("transport send failed: {e}")
        })
    }

    async fn send_batch<T>(&self, ws_tx: &mut T, batch: Vec<u8>) -> Result<()>
    where
        T: Sink<Message> + Unpin,
        <T as Sink<Message>>::Error: std::fmt::Display,
    {
        let audio = base64::engine::general_purpose::STANDARD.encode(&batch);
        self.send_event(ws_tx, &ClientEvent::InputAudioBufferAppend { audio })
            .await
    }

    async fn relay_tool_result<T>(
        &self,
        ws_tx: &mut T,
        id: String,
        result: ToolResult,
    ) -> Result<()>
    where
        T: Sink<Message> + Unpin,
        <T as Sink<Message>>::Error: std::fmt::Display,
    {
        let output = serde_json::to_string(&result)?;
        self.send_event(
            ws_tx,
            &ClientEvent::ConversationItemCreate {
                item: ConversationItem::function_call_output(id, output),
            },
        )
        .await?;
        // Ask the upstream to resume with the result in context.
        self.send_event(ws_tx, &ClientEvent::ResponseCreate {}).await
    }

    /// Handle one inbound text frame. Unparseable frames and unknown tags
    /// are skipped; only transport failures propagate an error.
    async fn handle_frame<T>(&mut self, ws_tx: &mut T, text: &str) -> Result<()>
    where
        T: Sink<Message> + Unpin,
        <T as Sink<Message>>::Error: std::fmt::Display,
    {
        let event: ServerEvent = match serde_json::from_str(text) {
            Ok(event) => event,
            Err(e) => {
                debug!(error = %e, "skipping unparseable frame");
                return Ok(());
            }
        };

        if let Some(next) = next_state(&self.state.borrow().clone(), &event) {
            self.publish(next);
        }

        match event {
            ServerEvent::SessionCreated {} => {
                // The upstream is ready: negotiate the session.
                let params = SessionParams {
                    modalities: vec!["text".to_string(), "audio".to_string()],
                    instructions: self.config.instructions.clone(),
                    voice: self.config.voice.clone(),
                    input_audio_format: "pcm16".to_string(),
                    output_audio_format: "pcm16".to_string(),
                    tools: self
                        .config
                        .tools
                        .iter()
                        .cloned()
                        .map(RealtimeTool::from)
                        .collect(),
                };
                self.send_event(ws_tx, &ClientEvent::SessionUpdate { session: params })
                    .await?;
            }
            ServerEvent::AudioTranscriptDelta { delta } => {
                let _ = self
                    .transcripts
                    .send(TranscriptEvent { text: delta, is_final: false })
                    .await;
            }
            ServerEvent::AudioTranscriptDone { transcript } => {
                let _ = self
                    .transcripts
                    .send(TranscriptEvent { text: transcript, is_final: true })
                    .await;
            }
            ServerEvent::AudioDelta { delta } => {
                match base64::engine::general_purpose::STANDARD.decode(&delta) {
                    Ok(pcm) => {
                        let samples = pcm.len() / 2;
                        let _ = self.audio.send(AudioFrame { pcm, samples }).await;
                    }
                    Err(e) => debug!(error = %e, "skipping undecodable audio delta"),
                }
            }
            ServerEvent::FunctionCallArgumentsDelta { call_id, output_index, delta } => {
                self.aggregator.apply(ToolCallFragment {
                    index: output_index,
                    id: call_id,
                    name: None,
                    arguments: Some(delta),
                });
            }
            ServerEvent::FunctionCallArgumentsDone { call_id, output_index, name, arguments } => {
                // If no delta ever reached us for this call, the done event
                // itself carries the full argument string.
                let known = self.aggregator.has_draft(&call_id)
                    || output_index.is_some_and(|i| self.aggregator.has_index(i));
                self.aggregator.apply(ToolCallFragment {
                    index: output_index,
                    id: Some(call_id.clone()),
                    name,
                    arguments: (!known).then_some(arguments),
                });
                match self.aggregator.finish(&call_id) {
                    Some(Ok(call)) => {
                        let _ = self.tool_calls.send(call).await;
                    }
                    Some(Err(e)) => warn!(error = %e, "dropping malformed tool call"),
                    None => {}
                }
            }
            ServerEvent::Error { error } => {
                warn!(message = %error.message, "upstream error event");
            }
            _ => {}
        }
        Ok(())
    }
}
