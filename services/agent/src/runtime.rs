//! Wires the transports, audio pipelines, and tool dispatcher together.

use crate::audio::{AudioCapture, AudioPlayback, CapturedBlock, SessionFormatConverter};
use crate::config::Config;
use crate::workout::InMemoryWorkoutLog;
use anyhow::{anyhow, Context, Result};
use repcoach_core::chat::{ChatClient, ChatEvent, ChatMessage};
use repcoach_core::tools::{schema, ToolDispatcher};
use repcoach_core::AgentState;
use repcoach_realtime::types::{AudioFrame, SESSION_SAMPLE_RATE};
use repcoach_realtime::{RealtimeConfig, RealtimeSession};
use secrecy::ExposeSecret;
use std::io::Write;
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Run the full voice loop until the session ends or the user interrupts.
///
/// A missing or broken audio device downgrades the run instead of failing
/// it: the session stays usable for tool calls and transcripts.
pub async fn run_voice(config: Config) -> Result<()> {
    let log = Arc::new(InMemoryWorkoutLog::new());
    let dispatcher = Arc::new(ToolDispatcher::new(log));

    let mut realtime = RealtimeConfig::new(
        config.openai_api_key.clone(),
        config.realtime_model.clone(),
    );
    realtime.voice = config.voice.clone();
    realtime.instructions = config.instructions.clone();
    realtime.tools = schema::registry();

    let (session, mut events) = RealtimeSession::connect(realtime)
        .await
        .context("could not open the realtime session")?;

    let (blocks_tx, blocks_rx) = mpsc::channel::<CapturedBlock>(64);
    let mut capture = match AudioCapture::new() {
        Ok(capture) => Some(capture),
        Err(e) => {
            warn!(error = %e, "microphone unavailable, continuing without capture");
            None
        }
    };
    if let Some(c) = capture.as_mut() {
        if let Err(e) = c.start(blocks_tx) {
            warn!(error = %e, "capture failed to start, continuing without it");
            capture = None;
        }
    }
    if let Some(c) = &capture {
        spawn_capture_forwarder(c.sample_rate(), blocks_rx, session.clone())?;
    }

    let mut playback = match AudioPlayback::new() {
        Ok(playback) => Some(playback),
        Err(e) => {
            warn!(error = %e, "speaker unavailable, continuing without playback");
            None
        }
    };

    let mut state_rx = events.state.clone();
    loop {
        tokio::select! {
            Some(frame) = events.audio.recv() => {
                if let Some(p) = playback.as_mut() {
                    if let Err(e) = p.play(&frame) {
                        warn!(error = %e, "playback failed, disabling output");
                        playback = None;
                    }
                }
            }
            Some(call) = events.tool_calls.recv() => {
                // Dispatch off the loop so a slow tool never stalls audio.
                let dispatcher = dispatcher.clone();
                let session = session.clone();
                tokio::spawn(async move {
                    let result = dispatcher.execute(&call).await;
                    session.send_tool_result(call.id.clone(), result).await;
                });
            }
            Some(transcript) = events.transcripts.recv() => {
                print!("{}", transcript.text);
                if transcript.is_final {
                    println!();
                }
                let _ = std::io::stdout().flush();
            }
            Some(_level) = events.levels.recv() => {
                // A UI would meter these; the CLI drains them.
            }
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = state_rx.borrow_and_update().clone();
                info!(state = ?state, "session state changed");
                match state {
                    AgentState::Error { message } => {
                        error!(%message, "session failed");
                        break;
                    }
                    AgentState::Idle => break,
                    _ => {}
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received, shutting down");
                break;
            }
            else => break,
        }
    }

    if let Some(c) = capture.as_mut() {
        c.stop();
    }
    if let Some(p) = playback.as_mut() {
        p.stop();
    }
    session.disconnect().await;
    Ok(())
}

/// Bridge device-rate capture blocks into session-format frames.
fn spawn_capture_forwarder(
    device_rate: u32,
    mut blocks: mpsc::Receiver<CapturedBlock>,
    session: RealtimeSession,
) -> Result<()> {
    let mut converter = SessionFormatConverter::new(device_rate, SESSION_SAMPLE_RATE)
        .context("could not build the capture resampler")?;
    tokio::spawn(async move {
        while let Some(block) = blocks.recv().await {
            match converter.push(&block.samples) {
                Ok(samples) if samples.is_empty() => {}
                Ok(samples) => {
                    session
                        .send_audio(AudioFrame::from_samples(&samples), block.level)
                        .await;
                }
                Err(e) => warn!(error = %e, "resampling failed, dropping block"),
            }
        }
    });
    Ok(())
}

/// Run the line-oriented chat loop: read a prompt from stdin, stream the
/// reply, execute any tool calls, repeat. `/quit` exits.
pub async fn run_text(config: Config) -> Result<()> {
    let api_key = config
        .openai_api_key
        .as_ref()
        .ok_or_else(|| anyhow!("OPENAI_API_KEY is not set"))?;

    let log = Arc::new(InMemoryWorkoutLog::new());
    let dispatcher = ToolDispatcher::new(log);
    let client = ChatClient::new(
        config.chat_base_url.clone(),
        api_key.expose_secret(),
        config.chat_model.clone(),
    );
    let tools = schema::registry();
    let mut history = vec![ChatMessage::system(config.instructions.clone())];

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    prompt()?;
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line == "/quit" {
            break;
        }
        if line.is_empty() {
            prompt()?;
            continue;
        }
        history.push(ChatMessage::user(line));

        let mut events = client
            .stream_chat(history.clone(), &tools, 1024)
            .await
            .context("chat request failed")?;
        let mut reply = String::new();
        while let Some(event) = events.recv().await {
            match event {
                ChatEvent::TextDelta(text) => {
                    print!("{text}");
                    let _ = std::io::stdout().flush();
                    reply.push_str(&text);
                }
                ChatEvent::ToolCall(call) => {
                    let result = dispatcher.execute(&call).await;
                    println!("\n[{}] {}", call.name, result.message);
                    let payload = serde_json::to_string(&result)
                        .unwrap_or_else(|_| "{\"success\":false}".to_string());
                    history.push(ChatMessage::assistant(format!(
                        "[executed {}: {payload}]",
                        call.name
                    )));
                }
                ChatEvent::Done => break,
            }
        }
        if !reply.is_empty() {
            println!();
            history.push(ChatMessage::assistant(reply));
        }
        prompt()?;
    }
    Ok(())
}

fn prompt() -> Result<()> {
    print!("> ");
    std::io::stdout().flush().context("stdout unavailable")?;
    Ok(())
}
