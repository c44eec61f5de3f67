//! Shared sample buffer between a decoder and the mixer.
//!
//! Decoders push samples tagged with the load ticket they were started for,
//! the mixer pulls samples and applies the buffer's gain.

use crate::sources::Sample;
use std::sync::{Arc, Mutex};

/// Threshold for compacting buffer - when read position exceeds this, we shift data.
/// At 48kHz, 48000 samples = 1 second worth of consumed audio.
const COMPACT_THRESHOLD: usize = 48000;

/// Buffer shared between a decoder thread, its owner and the mixer
pub type SharedBuffer = Arc<Mutex<PlaybackBuffer>>;

pub fn shared() -> SharedBuffer {
    Arc::new(Mutex::new(PlaybackBuffer::new()))
}

#[derive(Debug)]
pub struct PlaybackBuffer {
    position: usize,
    buffer: Vec<Sample>,
    eof: bool,
    paused: bool,
    volume: f32,
    /// Wrap around to the start once the decoder is done and the data runs out
    looping: bool,
    /// Keep consumed samples around so that `seek` can go backwards
    retain: bool,
    /// Ticket of the load currently allowed to write into this buffer
    load_ticket: Option<u64>,
    /// Set when the decoder gave up before producing anything playable
    failed: Option<String>,
    /// Total samples consumed since last clear() - for progress tracking
    total_samples_consumed: usize,
}

impl Default for PlaybackBuffer {
    fn default() -> Self {
        Self {
            position: 0,
            buffer: Vec::new(),
            eof: false,
            paused: true,
            volume: 1.0,
            looping: false,
            retain: false,
            load_ticket: None,
            failed: None,
            total_samples_consumed: 0,
        }
    }
}

impl PlaybackBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.position = 0;
        self.buffer.clear();
        self.eof = false;
        self.failed = None;
        self.total_samples_consumed = 0;
    }

    /// Drops any previous content and only accepts writes for `ticket` from
    /// now on.
    pub fn begin_load(&mut self, ticket: u64) {
        self.clear();
        self.paused = true;
        self.load_ticket = Some(ticket);
    }

    /// Stops playback and detaches the buffer from any in-flight load.
    pub fn reset(&mut self) {
        self.clear();
        self.paused = true;
        self.volume = 0.0;
        self.load_ticket = None;
    }

    pub fn accepts(&self, ticket: u64) -> bool {
        self.load_ticket == Some(ticket)
    }

    /// Compact the buffer by removing already-consumed samples
    fn compact(&mut self) {
        if self.position > 0 {
            self.buffer.drain(..self.position);
            self.position = 0;
        }
    }

    /// Read up to `count` samples at once, padding with silence if not enough available.
    pub fn pull_samples(&mut self, count: usize) -> Vec<Sample> {
        if self.paused {
            return vec![(0, 0); count];
        }

        let mut samples = Vec::with_capacity(count);

        while samples.len() < count {
            let available = self.buffer.len().saturating_sub(self.position);

            if available == 0 {
                if self.looping && self.eof && !self.buffer.is_empty() {
                    self.position = 0;
                    continue;
                }
                break;
            }

            let to_read = (count - samples.len()).min(available);
            samples.extend_from_slice(&self.buffer[self.position..self.position + to_read]);
            self.position += to_read;
            self.total_samples_consumed += to_read;
        }

        // Pad with silence if not enough samples
        samples.resize(count, (0, 0));

        // Compact periodically to prevent unbounded growth
        if !self.retain && !self.looping && self.position >= COMPACT_THRESHOLD {
            self.compact();
        }

        samples
    }

    /// Moves the read position, only meaningful for retained buffers.
    pub fn seek(&mut self, position: usize) {
        self.position = position.min(self.buffer.len());
        self.total_samples_consumed = self.position;
    }

    /// Get total playback position in seconds (survives buffer chunk clears)
    pub fn get_total_position_secs(&self, sample_rate: u32) -> f64 {
        self.total_samples_consumed as f64 / sample_rate as f64
    }

    pub fn push_samples<I: IntoIterator<Item = Sample>>(&mut self, samples: I) {
        self.buffer.extend(samples);
    }

    /// Pushes samples only if `ticket` still owns the buffer. Returns false
    /// when the load was superseded and the decoder should stop.
    pub fn push_samples_for<I: IntoIterator<Item = Sample>>(
        &mut self,
        ticket: u64,
        samples: I,
    ) -> bool {
        if !self.accepts(ticket) {
            return false;
        }
        self.push_samples(samples);
        true
    }

    pub fn is_eof(&self) -> bool {
        self.eof
    }

    pub fn set_eof(&mut self, eof: bool) {
        self.eof = eof;
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    pub fn set_retain(&mut self, retain: bool) {
        self.retain = retain;
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        self.failed = Some(reason.into());
        self.eof = true;
    }

    pub fn failure(&self) -> Option<&str> {
        self.failed.as_deref()
    }

    /// Whether starting playback would produce any audio at all
    pub fn is_playable(&self) -> bool {
        self.failed.is_none() && !(self.eof && self.buffer.is_empty())
    }

    /// Check if buffer has audio data available
    pub fn has_data(&self) -> bool {
        self.position < self.buffer.len()
    }

    /// True once a non-looping buffer has played everything its decoder produced
    pub fn is_drained(&self) -> bool {
        self.eof && !self.looping && !self.has_data()
    }

    /// Get current buffer level in samples (for diagnostics)
    pub fn buffer_level(&self) -> usize {
        self.buffer.len().saturating_sub(self.position)
    }
}
