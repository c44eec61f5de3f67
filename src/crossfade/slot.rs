use crate::{
    buffer::SharedBuffer,
    crossfade::{
        ramp::{FadeDirection, FadeOperation, FadeToken},
        CrossfadeAction,
    },
    event::{Event, EventBus},
    sources::track,
};
use anyhow::{anyhow, bail, Result};
use tokio::time::Instant;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SlotId {
    A,
    B,
}

impl SlotId {
    pub fn other(self) -> SlotId {
        match self {
            SlotId::A => SlotId::B,
            SlotId::B => SlotId::A,
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            SlotId::A => 0,
            SlotId::B => 1,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Loading,
    Playing,
}

/// The audio device behind a slot.
///
/// `load` completes asynchronously: the implementation reports
/// [CrossfadeAction::SlotLoaded] with the same ticket once the track can
/// start playing, or with an error if it never will.
pub trait SlotOutput: Send + Sync {
    fn load(&mut self, track: &str, ticket: u64);

    /// Starts or resumes playback. Fails when the output refuses to play.
    fn play(&mut self) -> Result<()>;

    fn pause(&mut self);

    /// Stops playback and drops the loaded resource entirely.
    fn reset(&mut self);

    fn set_volume(&mut self, volume: f32);
}

/// One of the scheduler's two playback handles.
pub struct AudioSlot {
    id: SlotId,
    resource_ref: Option<String>,
    current_volume: f32,
    playback_state: PlaybackState,
    fade: Option<FadeOperation>,
    output: Box<dyn SlotOutput>,
}

impl std::fmt::Debug for AudioSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioSlot")
            .field("id", &self.id)
            .field("resource_ref", &self.resource_ref)
            .field("current_volume", &self.current_volume)
            .field("playback_state", &self.playback_state)
            .field("fade", &self.fade)
            .finish()
    }
}

impl AudioSlot {
    pub fn new(id: SlotId, output: Box<dyn SlotOutput>) -> Self {
        Self {
            id,
            resource_ref: None,
            current_volume: 0.0,
            playback_state: PlaybackState::Stopped,
            fade: None,
            output,
        }
    }

    pub fn id(&self) -> SlotId {
        self.id
    }

    pub fn resource_ref(&self) -> Option<&str> {
        self.resource_ref.as_deref()
    }

    pub fn current_volume(&self) -> f32 {
        self.current_volume
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.playback_state
    }

    pub fn fade(&self) -> Option<&FadeOperation> {
        self.fade.as_ref()
    }

    pub fn is_audible(&self) -> bool {
        self.playback_state == PlaybackState::Playing && self.current_volume > 0.0
    }

    pub(super) fn begin_load(&mut self, track: &str, ticket: u64) {
        self.fade = None;
        self.resource_ref = Some(track.to_string());
        self.playback_state = PlaybackState::Loading;
        self.apply_volume(0.0);
        self.output.load(track, ticket);
    }

    /// Marks the loaded resource as ready without starting it.
    pub(super) fn mark_loaded(&mut self) {
        if self.playback_state == PlaybackState::Loading {
            self.playback_state = PlaybackState::Stopped;
        }
    }

    pub(super) fn start(&mut self) -> Result<()> {
        if self.resource_ref.is_none() {
            bail!("slot {:?} has no track loaded", self.id);
        }
        match self.output.play() {
            Ok(()) => {
                self.playback_state = PlaybackState::Playing;
                Ok(())
            }
            Err(e) => {
                self.fade = None;
                self.playback_state = PlaybackState::Stopped;
                Err(e)
            }
        }
    }

    pub(super) fn pause(&mut self) {
        self.fade = None;
        self.output.pause();
        if self.playback_state == PlaybackState::Playing {
            self.playback_state = PlaybackState::Stopped;
        }
    }

    pub(super) fn reset(&mut self) {
        self.fade = None;
        self.resource_ref = None;
        self.playback_state = PlaybackState::Stopped;
        self.current_volume = 0.0;
        self.output.reset();
    }

    pub(super) fn apply_volume(&mut self, volume: f32) {
        self.current_volume = volume.clamp(0.0, 1.0);
        self.output.set_volume(self.current_volume);
    }

    /// Replaces any running ramp. The new ramp must start from the live
    /// volume, callers build it with [AudioSlot::current_volume].
    pub(super) fn begin_fade(&mut self, fade: FadeOperation) {
        self.fade = Some(fade);
    }

    /// Advances the running ramp to `now`. Returns the ramp's token and
    /// direction when it finished on this frame.
    pub(super) fn advance(&mut self, now: Instant) -> Option<(FadeToken, FadeDirection)> {
        let fade = self.fade.as_ref()?;
        let volume = fade.volume_at(now);
        let finished = fade.is_complete(now).then_some((fade.token, fade.direction));
        let target = fade.target_volume;

        trace!("Slot {:?} volume {:.3}", self.id, volume);

        if finished.is_some() {
            self.fade = None;
            self.apply_volume(target);
        } else {
            self.apply_volume(volume);
        }
        finished
    }
}

/// Slot output backed by a mixer buffer. Tracks loop until reset.
pub struct BufferedSlot {
    id: SlotId,
    buffer: SharedBuffer,
    bus: EventBus,
}

impl BufferedSlot {
    pub fn new(id: SlotId, buffer: SharedBuffer, bus: &EventBus) -> Self {
        Self {
            id,
            buffer,
            bus: bus.clone(),
        }
    }

    fn with_buffer<T>(&self, f: impl FnOnce(&mut crate::buffer::PlaybackBuffer) -> T) -> Option<T> {
        match self.buffer.lock() {
            Ok(mut buffer) => Some(f(&mut buffer)),
            Err(_) => {
                error!("Buffer of slot {:?} is poisoned", self.id);
                None
            }
        }
    }
}

impl SlotOutput for BufferedSlot {
    fn load(&mut self, track: &str, ticket: u64) {
        self.with_buffer(|buffer| {
            buffer.begin_load(ticket);
            buffer.set_looping(true);
        });

        let bus = self.bus.clone();
        let slot = self.id;
        track::spawn_load(
            track.to_string(),
            ticket,
            self.buffer.clone(),
            Box::new(move |result| {
                bus.send(Event::Crossfade(CrossfadeAction::SlotLoaded {
                    slot,
                    ticket,
                    result,
                }));
            }),
        );
    }

    fn play(&mut self) -> Result<()> {
        let mut buffer = self
            .buffer
            .lock()
            .map_err(|_| anyhow!("Buffer of slot {:?} is poisoned", self.id))?;

        if !buffer.is_playable() {
            let reason = buffer.failure().unwrap_or("nothing decoded").to_string();
            bail!("slot {:?} refused to play: {reason}", self.id);
        }

        buffer.set_paused(false);
        Ok(())
    }

    fn pause(&mut self) {
        self.with_buffer(|buffer| buffer.set_paused(true));
    }

    fn reset(&mut self) {
        self.with_buffer(|buffer| buffer.reset());
    }

    fn set_volume(&mut self, volume: f32) {
        self.with_buffer(|buffer| buffer.set_volume(volume));
    }
}
