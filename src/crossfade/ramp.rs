//! Time-based volume ramps.
//!
//! A ramp is recomputed from elapsed wall time on every frame, so frame rate
//! jitter never stretches or shortens a fade.

use std::time::Duration;
use tokio::time::Instant;

/// Ease-in-out quadratic curve over `progress` in [0, 1].
pub fn ease_in_out_quad(progress: f64) -> f64 {
    let t = progress.clamp(0.0, 1.0);
    if t < 0.5 {
        2.0 * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FadeDirection {
    In,
    Out,
}

/// Identity of a ramp. A completion is only acted upon while the slot's
/// active ramp still carries the same token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FadeToken(u64);

#[derive(Debug, Default)]
pub struct TokenSource {
    next: u64,
}

impl TokenSource {
    pub fn issue(&mut self) -> FadeToken {
        self.next += 1;
        FadeToken(self.next)
    }
}

#[derive(Clone, Debug)]
pub struct FadeOperation {
    pub token: FadeToken,
    pub direction: FadeDirection,
    pub start_volume: f32,
    pub target_volume: f32,
    pub started_at: Instant,
    pub duration: Duration,
}

impl FadeOperation {
    pub fn new(
        token: FadeToken,
        direction: FadeDirection,
        start_volume: f32,
        target_volume: f32,
        started_at: Instant,
        duration: Duration,
    ) -> Self {
        Self {
            token,
            direction,
            start_volume: start_volume.clamp(0.0, 1.0),
            target_volume: target_volume.clamp(0.0, 1.0),
            started_at,
            duration,
        }
    }

    pub fn progress(&self, now: Instant) -> f64 {
        if self.duration.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(self.started_at);
        (elapsed.as_secs_f64() / self.duration.as_secs_f64()).clamp(0.0, 1.0)
    }

    pub fn volume_at(&self, now: Instant) -> f32 {
        let eased = ease_in_out_quad(self.progress(now)) as f32;
        self.start_volume + (self.target_volume - self.start_volume) * eased
    }

    pub fn is_complete(&self, now: Instant) -> bool {
        self.progress(now) >= 1.0
    }
}
