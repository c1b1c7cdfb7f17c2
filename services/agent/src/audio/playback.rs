//! Speaker playback.
//!
//! Inbound session audio is resampled to the output device's rate and
//! pushed into a lock-free ring buffer; the device callback drains it and
//! pads with silence when it runs dry. Frames play gaplessly in arrival
//! order as long as the producer keeps up.

use super::codec::{pcm16_to_f32, SessionFormatConverter};
use super::AudioError;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};
use repcoach_realtime::types::{AudioFrame, SESSION_SAMPLE_RATE};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapProd, HeapRb};
use tracing::{debug, error, info, warn};

/// Ring capacity in samples: a few seconds at the device rate so a burst of
/// inbound frames does not drop.
const BUFFER_SECONDS: u32 = 4;

pub struct AudioPlayback {
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
    producer: Option<HeapProd<i16>>,
    converter: SessionFormatConverter,
}

impl AudioPlayback {
    /// Open the default output device.
    pub fn new() -> Result<Self, AudioError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| AudioError::NoDevice("no output device".into()))?;
        info!(
            device = %device.name().unwrap_or_else(|_| "unknown".to_string()),
            "using output device"
        );

        let config: StreamConfig = device
            .default_output_config()
            .map_err(|e| AudioError::Config(e.to_string()))?
            .into();

        let converter = SessionFormatConverter::new(SESSION_SAMPLE_RATE, config.sample_rate.0)
            .map_err(|e| AudioError::Config(e.to_string()))?;

        Ok(Self {
            device,
            config,
            stream: None,
            producer: None,
            converter,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    pub fn is_running(&self) -> bool {
        self.stream.is_some()
    }

    /// Build the output stream and start draining the ring. Idempotent
    /// while running.
    pub fn start(&mut self) -> Result<(), AudioError> {
        if self.stream.is_some() {
            return Ok(());
        }

        let capacity = (self.config.sample_rate.0 * BUFFER_SECONDS) as usize;
        let (producer, mut consumer) = HeapRb::<i16>::new(capacity).split();
        let channels = self.config.channels as usize;

        let err_fn = |err| {
            error!(error = %err, "output stream error");
        };

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    for frame in data.chunks_mut(channels) {
                        // Mono source duplicated across output channels;
                        // silence when the ring runs dry.
                        let sample = consumer
                            .try_pop()
                            .map(|s| s as f32 / 32768.0)
                            .unwrap_or(0.0);
                        for slot in frame {
                            *slot = sample;
                        }
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
        self.producer = Some(producer);
        info!("speaker playback started");
        Ok(())
    }

    /// Enqueue one inbound frame, starting the stream on first use.
    pub fn play(&mut self, frame: &AudioFrame) -> Result<(), AudioError> {
        self.start()?;

        let device_samples = self
            .converter
            .push(&pcm16_to_f32(&frame.to_samples()))
            .map_err(|e| AudioError::Stream(e.to_string()))?;
        if device_samples.is_empty() {
            return Ok(());
        }

        let producer = self
            .producer
            .as_mut()
            .ok_or_else(|| AudioError::Stream("playback not started".into()))?;
        let pushed = producer.push_slice(&device_samples);
        if pushed < device_samples.len() {
            warn!(
                dropped = device_samples.len() - pushed,
                "playback ring full, dropping samples"
            );
        } else {
            debug!(samples = pushed, "queued playback samples");
        }
        Ok(())
    }

    /// Stop playback and discard whatever is still queued.
    pub fn stop(&mut self) {
        self.producer = None;
        if self.stream.take().is_some() {
            info!("speaker playback stopped");
        }
    }
}

impl Drop for AudioPlayback {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Device-dependent: guarded so they pass on machines without audio.

    #[test]
    fn playback_reports_a_plausible_format() {
        if let Ok(playback) = AudioPlayback::new() {
            assert!(playback.sample_rate() > 0);
            assert!(!playback.is_running());
        }
    }

    #[test]
    fn play_starts_the_stream_on_first_frame() {
        if let Ok(mut playback) = AudioPlayback::new() {
            let frame = AudioFrame::from_samples(&[0i16; 480]);
            if playback.play(&frame).is_ok() {
                assert!(playback.is_running());
                playback.stop();
                assert!(!playback.is_running());
            }
        }
    }
}
