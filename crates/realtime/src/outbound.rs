//! Accumulates captured audio into batched transport messages.
//!
//! Microphone blocks are small and frequent; sending each one as its own
//! frame wastes the connection. The buffer holds appended bytes until either
//! a size threshold is reached or a time threshold has elapsed since the
//! first unflushed byte, then hands the whole batch back for one transport
//! message. An empty buffer never flushes, and every flush resets both the
//! byte count and the clock.

use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct OutboundAudioBuffer {
    max_bytes: usize,
    max_wait: Duration,
    data: Vec<u8>,
    oldest: Option<Instant>,
}

impl OutboundAudioBuffer {
    pub fn new(max_bytes: usize, max_wait: Duration) -> Self {
        Self {
            max_bytes,
            max_wait,
            data: Vec::with_capacity(max_bytes),
            oldest: None,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Append captured bytes; returns the batch if this append crossed
    /// either threshold.
    pub fn append(&mut self, bytes: &[u8], now: Instant) -> Option<Vec<u8>> {
        if bytes.is_empty() {
            return self.poll(now);
        }
        self.oldest.get_or_insert(now);
        self.data.extend_from_slice(bytes);
        if self.data.len() >= self.max_bytes || self.overdue(now) {
            self.flush()
        } else {
            None
        }
    }

    /// Time-based check, called on a tick between appends. Returns the
    /// batch if the oldest byte has waited past the time threshold.
    pub fn poll(&mut self, now: Instant) -> Option<Vec<u8>> {
        if self.overdue(now) { self.flush() } else { None }
    }

    /// Unconditional drain, for teardown. Still never yields an empty batch.
    pub fn drain(&mut self) -> Option<Vec<u8>> {
        self.flush()
    }

    fn overdue(&self, now: Instant) -> bool {
        match self.oldest {
            Some(oldest) => !self.data.is_empty() && now.duration_since(oldest) >= self.max_wait,
            None => false,
        }
    }

    fn flush(&mut self) -> Option<Vec<u8>> {
        self.oldest = None;
        if self.data.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.data))
        }
    }
}
