//! Microphone capture.
//!
//! Each device callback downmixes to mono, measures the level, and hands
//! the block off through a bounded channel. The callback never blocks: if
//! the consumer falls behind, blocks are dropped and the session simply
//! hears a gap.

use super::codec::{downmix_to_mono, mean_level};
use super::AudioError;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// One callback's worth of microphone audio, mono at the device rate.
#[derive(Debug, Clone)]
pub struct CapturedBlock {
    pub samples: Vec<f32>,
    /// Mean absolute amplitude of this block, in [0, 1].
    pub level: f32,
}

pub struct AudioCapture {
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
}

impl AudioCapture {
    /// Open the default input device.
    pub fn new() -> Result<Self, AudioError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| AudioError::NoDevice("no input device".into()))?;
        info!(
            device = %device.name().unwrap_or_else(|_| "unknown".to_string()),
            "using input device"
        );

        let config = device
            .default_input_config()
            .map_err(|e| AudioError::Config(e.to_string()))?
            .into();

        Ok(Self {
            device,
            config,
            stream: None,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    pub fn channels(&self) -> u16 {
        self.config.channels
    }

    pub fn is_running(&self) -> bool {
        self.stream.is_some()
    }

    /// Start capturing into the given channel. Idempotent while running.
    pub fn start(&mut self, blocks: mpsc::Sender<CapturedBlock>) -> Result<(), AudioError> {
        if self.stream.is_some() {
            warn!("capture already running");
            return Ok(());
        }

        let channels = self.config.channels as usize;
        let err_fn = |err| {
            error!(error = %err, "input stream error");
        };

        let stream = self
            .device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let samples = downmix_to_mono(data, channels);
                    let level = mean_level(&samples);
                    if let Err(e) = blocks.try_send(CapturedBlock { samples, level }) {
                        debug!(error = %e, "dropping capture block");
                    }
                },
                err_fn,
                None,
            )
            .map_err(|e| AudioError::Stream(e.to_string()))?;

        stream
            .play()
            .map_err(|e| AudioError::Stream(e.to_string()))?;
        self.stream = Some(stream);
        info!("microphone capture started");
        Ok(())
    }

    /// Stop capturing. Safe to call when not running.
    pub fn stop(&mut self) {
        if self.stream.take().is_some() {
            info!("microphone capture stopped");
        }
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.stop();
    }
}
