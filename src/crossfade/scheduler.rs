use crate::{
    buffer::SharedBuffer,
    config::AudioConfig,
    crossfade::{
        ramp::{FadeDirection, FadeOperation, FadeToken, TokenSource},
        slot::{AudioSlot, BufferedSlot, PlaybackState, SlotId, SlotOutput},
    },
    event::{Event, EventBus},
};
use anyhow::Result;
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::RwLock,
    time::{Instant, MissedTickBehavior},
};

/// Volumes closer than this are considered equal
const VOLUME_EPSILON: f32 = 0.001;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CrossfadeConfig {
    /// Steady-state volume of the playing slot
    pub volume: f32,
    /// Default duration of crossfades and volume ramps
    pub crossfade: Duration,
    /// Default duration of the fade to silence on deactivation
    pub deactivate_fade: Duration,
    /// Interval between ramp updates
    pub frame: Duration,
}

impl Default for CrossfadeConfig {
    fn default() -> Self {
        Self {
            volume: 0.2,
            crossfade: Duration::from_millis(2000),
            deactivate_fade: Duration::from_millis(2000),
            frame: Duration::from_millis(16),
        }
    }
}

impl From<&AudioConfig> for CrossfadeConfig {
    fn from(config: &AudioConfig) -> Self {
        Self {
            volume: config.volume,
            crossfade: config.crossfade(),
            deactivate_fade: config.deactivate_fade(),
            frame: config.frame(),
        }
    }
}

#[derive(Clone, Debug)]
pub enum CrossfadeAction {
    /// Move ambient playback to `track` at `volume`
    SetTarget {
        track: String,
        volume: f32,
        duration: Option<Duration>,
    },

    /// Ramp the steady-state volume
    SetVolume(f32),

    /// Resume (fade in) or silence (fade out, then pause) ambient audio
    SetActive {
        active: bool,
        fade: Option<Duration>,
    },

    /// A slot output finished loading, or failed to
    SlotLoaded {
        slot: SlotId,
        ticket: u64,
        result: Result<(), String>,
    },

    /// Notification that slot roles were swapped after a transition
    TransitionComplete { track: String },

    /// Notification that a slot output refused to start playing
    PlaybackRejected { slot: SlotId, reason: String },

    /// Stop everything and release both slots
    Dispose,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetOutcome {
    /// A load was issued
    Started,
    /// The track is already the current one
    Unchanged,
    /// Another transition is in flight, the request waits for it
    Queued,
    Disposed,
}

#[derive(Clone, Debug)]
enum Transition {
    /// Loading into the current slot while nothing else is audible
    Initial { ticket: u64, duration: Duration },
    /// Loading into the idle slot, the crossfade starts once it is ready
    Loading { ticket: u64, duration: Duration },
    /// Both ramps are running, done when the outgoing ramp completes
    Fading { fade_out: FadeToken },
}

#[derive(Clone, Debug)]
struct QueuedTarget {
    track: String,
    volume: f32,
    duration: Option<Duration>,
}

/// Dual-slot ambient track scheduler.
///
/// Exactly one slot is "current". Track changes load into the idle slot,
/// ramp both slots over the same duration and then swap roles. At most one
/// load-and-transition is in flight; later requests wait in a single-entry
/// queue where a newer request replaces an older one.
pub struct CrossfadeScheduler {
    slots: [AudioSlot; 2],
    current: SlotId,
    config: CrossfadeConfig,
    steady_volume: f32,
    active: bool,
    transition: Option<Transition>,
    queued: Option<QueuedTarget>,
    /// Fade-out that pauses the current slot when it completes
    pending_pause: Option<FadeToken>,
    tokens: TokenSource,
    tickets: u64,
    disposed: bool,
    bus: EventBus,
}

impl std::fmt::Debug for CrossfadeScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrossfadeScheduler")
            .field("slots", &self.slots)
            .field("current", &self.current)
            .field("steady_volume", &self.steady_volume)
            .field("active", &self.active)
            .field("transition", &self.transition)
            .field("queued", &self.queued)
            .field("disposed", &self.disposed)
            .finish()
    }
}

impl CrossfadeScheduler {
    pub fn new(
        config: CrossfadeConfig,
        slot_a: Box<dyn SlotOutput>,
        slot_b: Box<dyn SlotOutput>,
        bus: &EventBus,
    ) -> Self {
        Self {
            slots: [
                AudioSlot::new(SlotId::A, slot_a),
                AudioSlot::new(SlotId::B, slot_b),
            ],
            current: SlotId::A,
            steady_volume: config.volume.clamp(0.0, 1.0),
            config,
            active: true,
            transition: None,
            queued: None,
            pending_pause: None,
            tokens: TokenSource::default(),
            tickets: 0,
            disposed: false,
            bus: bus.clone(),
        }
    }

    pub fn config(&self) -> &CrossfadeConfig {
        &self.config
    }

    pub fn slot(&self, id: SlotId) -> &AudioSlot {
        &self.slots[id.index()]
    }

    pub fn current_slot(&self) -> &AudioSlot {
        self.slot(self.current)
    }

    pub fn idle_slot(&self) -> &AudioSlot {
        self.slot(self.current.other())
    }

    pub fn steady_volume(&self) -> f32 {
        self.steady_volume
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_transitioning(&self) -> bool {
        self.transition.is_some()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn queued_track(&self) -> Option<&str> {
        self.queued.as_ref().map(|queued| queued.track.as_str())
    }

    fn slot_mut(&mut self, id: SlotId) -> &mut AudioSlot {
        &mut self.slots[id.index()]
    }

    fn next_ticket(&mut self) -> u64 {
        self.tickets += 1;
        self.tickets
    }

    /// Starts a ramp on `id` from its live volume, replacing any ramp the
    /// slot already had.
    fn fade(
        &mut self,
        id: SlotId,
        direction: FadeDirection,
        target: f32,
        duration: Duration,
    ) -> FadeToken {
        let token = self.tokens.issue();
        let slot = self.slot_mut(id);
        let fade = FadeOperation::new(
            token,
            direction,
            slot.current_volume(),
            target,
            Instant::now(),
            duration,
        );
        slot.begin_fade(fade);
        token
    }

    /// Ramps a playing slot to `volume` unless it is already settled there.
    fn retarget(&mut self, id: SlotId, volume: f32, duration: Duration) {
        let slot = self.slot(id);
        let settled = slot.fade().is_none() && (slot.current_volume() - volume).abs() < VOLUME_EPSILON;
        let heading_there = slot.fade().is_some_and(|fade| {
            fade.direction == FadeDirection::In && (fade.target_volume - volume).abs() < VOLUME_EPSILON
        });

        if !settled && !heading_there {
            self.fade(id, FadeDirection::In, volume, duration);
        }
    }

    pub fn set_target(
        &mut self,
        track: &str,
        volume: f32,
        duration: Option<Duration>,
    ) -> TargetOutcome {
        if self.disposed {
            return TargetOutcome::Disposed;
        }
        let volume = volume.clamp(0.0, 1.0);

        if self.transition.is_some() || self.pending_pause.is_some() {
            let queued = QueuedTarget {
                track: track.to_string(),
                volume,
                duration,
            };
            if let Some(dropped) = self.queued.replace(queued) {
                debug!("Dropping superseded ambient track {}", dropped.track);
            }
            debug!("Ambient transition in flight, queueing {track}");
            return TargetOutcome::Queued;
        }

        let duration = duration.unwrap_or(self.config.crossfade);
        self.steady_volume = volume;

        let current = self.current;
        let loaded = self.slot(current).resource_ref().map(str::to_string);

        match loaded {
            None => {
                self.load_current(track, duration);
                TargetOutcome::Started
            }
            Some(loaded) if loaded == track => {
                if self.active && self.slot(current).playback_state() == PlaybackState::Playing {
                    self.retarget(current, volume, duration);
                }
                TargetOutcome::Unchanged
            }
            Some(_) if !self.active => {
                // Nothing is audible, replace the track in place
                self.slot_mut(current).reset();
                self.load_current(track, duration);
                TargetOutcome::Started
            }
            Some(_) => {
                let idle = current.other();
                let ticket = self.next_ticket();
                info!("Loading ambient track {track} into slot {idle:?}");

                let slot = self.slot_mut(idle);
                slot.reset();
                slot.begin_load(track, ticket);
                self.transition = Some(Transition::Loading { ticket, duration });
                TargetOutcome::Started
            }
        }
    }

    fn load_current(&mut self, track: &str, duration: Duration) {
        let ticket = self.next_ticket();
        let current = self.current;
        info!("Loading ambient track {track} into slot {current:?}");

        self.slot_mut(current).begin_load(track, ticket);
        self.transition = Some(Transition::Initial { ticket, duration });
    }

    /// Applies a load completion reported by a slot output. Completions
    /// that do not match the in-flight load are ignored.
    pub fn on_slot_loaded(
        &mut self,
        slot: SlotId,
        ticket: u64,
        result: Result<(), String>,
    ) -> Result<()> {
        if self.disposed {
            return Ok(());
        }

        let (crossfade, duration) = match self.transition.take() {
            Some(Transition::Initial { ticket: t, duration })
                if t == ticket && slot == self.current =>
            {
                (false, duration)
            }
            Some(Transition::Loading { ticket: t, duration })
                if t == ticket && slot == self.current.other() =>
            {
                (true, duration)
            }
            other => {
                self.transition = other;
                debug!("Ignoring stale load of slot {slot:?} (ticket {ticket})");
                return Ok(());
            }
        };

        if let Err(reason) = result {
            warn!("Ambient track in slot {slot:?} failed to load: {reason}");
            self.slot_mut(slot).reset();
            self.run_queued();
            return Ok(());
        }

        self.slot_mut(slot).mark_loaded();

        if !crossfade {
            let started = if self.active {
                self.start_current(duration)
            } else {
                Ok(())
            };
            self.run_queued();
            return started;
        }

        if !self.active {
            // Went silent while loading, the new track takes over quietly
            self.swap_roles();
            self.run_queued();
            return Ok(());
        }

        if let Err(e) = self.slot_mut(slot).start() {
            self.reject(slot, &e);
            self.slot_mut(slot).reset();
            self.run_queued();
            return Err(e);
        }

        let volume = self.steady_volume;
        let outgoing = self.current;
        self.fade(slot, FadeDirection::In, volume, duration);
        let fade_out = self.fade(outgoing, FadeDirection::Out, 0.0, duration);
        self.transition = Some(Transition::Fading { fade_out });

        debug!("Crossfading slot {outgoing:?} -> {slot:?} over {duration:?}");
        Ok(())
    }

    /// Plays the current slot if needed and ramps it to the steady volume.
    fn start_current(&mut self, duration: Duration) -> Result<()> {
        let current = self.current;

        if self.slot(current).playback_state() != PlaybackState::Playing {
            if let Err(e) = self.slot_mut(current).start() {
                self.reject(current, &e);
                return Err(e);
            }
        }

        let volume = self.steady_volume;
        self.fade(current, FadeDirection::In, volume, duration);
        Ok(())
    }

    fn reject(&self, slot: SlotId, e: &anyhow::Error) {
        warn!("Ambient playback rejected in slot {slot:?}: {e:#}");
        self.bus
            .send(Event::Crossfade(CrossfadeAction::PlaybackRejected {
                slot,
                reason: format!("{e:#}"),
            }));
    }

    /// Makes the idle slot current, resets the outgoing slot and reports
    /// the transition as complete.
    fn swap_roles(&mut self) {
        let outgoing = self.current;
        self.current = outgoing.other();
        self.drop_pending_pause(outgoing);
        self.slot_mut(outgoing).reset();
        self.transition = None;

        if let Some(track) = self.current_slot().resource_ref().map(str::to_string) {
            info!(
                "Ambient transition complete, {track} now current in slot {:?}",
                self.current
            );
            self.bus
                .send(Event::Crossfade(CrossfadeAction::TransitionComplete { track }));
        }
    }

    /// Forgets the pending pause when it belongs to `id`, whose ramp is
    /// about to go away.
    fn drop_pending_pause(&mut self, id: SlotId) {
        let token = self.slot(id).fade().map(|fade| fade.token);
        if token.is_some() && token == self.pending_pause {
            self.pending_pause = None;
        }
    }

    fn run_queued(&mut self) {
        if let Some(queued) = self.queued.take() {
            self.set_target(&queued.track, queued.volume, queued.duration);
        }
    }

    /// Advances every running ramp to `now` and settles the ones that
    /// finished.
    pub fn tick(&mut self, now: Instant) {
        if self.disposed {
            return;
        }

        let finished: Vec<(SlotId, FadeToken)> = self
            .slots
            .iter_mut()
            .filter_map(|slot| slot.advance(now).map(|(token, _)| (slot.id(), token)))
            .collect();

        for (id, token) in finished {
            if self.pending_pause == Some(token) {
                self.pending_pause = None;
                self.slot_mut(id).pause();
                info!("Ambient audio paused");
                self.run_queued();
            }

            if matches!(self.transition, Some(Transition::Fading { fade_out }) if fade_out == token) {
                self.swap_roles();
                self.run_queued();
            }
        }
    }

    pub fn set_volume(&mut self, volume: f32) {
        if self.disposed {
            return;
        }
        self.steady_volume = volume.clamp(0.0, 1.0);

        // Picked up by the next activation
        if !self.active || self.pending_pause.is_some() {
            return;
        }

        let target = match self.transition {
            Some(Transition::Fading { .. }) => self.current.other(),
            _ => self.current,
        };

        if self.slot(target).playback_state() == PlaybackState::Playing {
            let (volume, duration) = (self.steady_volume, self.config.crossfade);
            self.retarget(target, volume, duration);
        }
    }

    pub fn set_active(&mut self, active: bool, fade: Option<Duration>) -> Result<()> {
        if self.disposed {
            return Ok(());
        }
        let duration = fade.unwrap_or(self.config.deactivate_fade);

        if active {
            self.activate(duration)
        } else {
            self.deactivate(duration);
            Ok(())
        }
    }

    fn activate(&mut self, duration: Duration) -> Result<()> {
        let was_active = std::mem::replace(&mut self.active, true);
        let was_pausing = self.pending_pause.take().is_some();

        // A pending load starts playback itself once it completes
        if self.transition.is_some() {
            return Ok(());
        }

        let slot = self.current_slot();
        if slot.resource_ref().is_none() {
            self.run_queued();
            return Ok(());
        }

        let steady = self.steady_volume;
        let settled = slot.playback_state() == PlaybackState::Playing
            && match slot.fade() {
                None => (slot.current_volume() - steady).abs() < VOLUME_EPSILON,
                Some(fade) => {
                    fade.direction == FadeDirection::In
                        && (fade.target_volume - steady).abs() < VOLUME_EPSILON
                }
            };

        if was_active && !was_pausing && settled {
            return Ok(());
        }

        let started = self.start_current(duration);
        self.run_queued();
        started
    }

    fn deactivate(&mut self, duration: Duration) {
        self.active = false;

        match self.transition {
            // Cut a running crossfade short in favour of the incoming track
            Some(Transition::Fading { .. }) => self.swap_roles(),
            // Abandon the incoming track, it is swapped in place once silent
            Some(Transition::Loading { duration, .. }) => {
                let idle = self.current.other();
                let track = self.slot(idle).resource_ref().map(str::to_string);
                self.slot_mut(idle).reset();
                self.transition = None;

                if let (Some(track), None) = (track, &self.queued) {
                    debug!("Deferring ambient track {track} until silent");
                    self.queued = Some(QueuedTarget {
                        track,
                        volume: self.steady_volume,
                        duration: Some(duration),
                    });
                }
            }
            _ => {}
        }

        let current = self.current;
        if self.slot(current).playback_state() == PlaybackState::Playing {
            let token = self.fade(current, FadeDirection::Out, 0.0, duration);
            self.pending_pause = Some(token);
        } else if self.transition.is_none() {
            self.run_queued();
        }
    }

    /// Cancels all ramps and releases both slots. Idempotent, also runs on
    /// drop.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.transition = None;
        self.queued = None;
        self.pending_pause = None;

        for slot in self.slots.iter_mut() {
            slot.reset();
        }

        info!("Crossfade scheduler disposed");
    }
}

impl Drop for CrossfadeScheduler {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Type alias for the shared scheduler
pub type SharedScheduler = Arc<RwLock<CrossfadeScheduler>>;

/// Creates a scheduler driving the two given mixer buffers and starts its
/// event and frame loops.
pub fn init(bus: &EventBus, config: CrossfadeConfig, buffers: [SharedBuffer; 2]) -> SharedScheduler {
    let [buffer_a, buffer_b] = buffers;
    let scheduler = CrossfadeScheduler::new(
        config,
        Box::new(BufferedSlot::new(SlotId::A, buffer_a, bus)),
        Box::new(BufferedSlot::new(SlotId::B, buffer_b, bus)),
        bus,
    );

    start(bus, scheduler)
}

/// Starts the event and frame loops for an already built scheduler.
pub fn start(bus: &EventBus, scheduler: CrossfadeScheduler) -> SharedScheduler {
    let frame = scheduler.config().frame;
    let scheduler = Arc::new(RwLock::new(scheduler));

    handle_incoming_event_loop(bus.clone(), scheduler.clone());
    frame_loop(frame, scheduler.clone());

    scheduler
}

/// Advances ramps once per frame until the scheduler is disposed
fn frame_loop(frame: Duration, scheduler: SharedScheduler) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(frame);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;

            let mut scheduler = scheduler.write().await;
            if scheduler.is_disposed() {
                break;
            }
            scheduler.tick(Instant::now());
        }
    });
}

fn handle_incoming_event_loop(bus: EventBus, scheduler: SharedScheduler) {
    tokio::spawn(async move {
        let mut bus_rx = bus.subscribe();

        while let Some(event) = bus_rx.recv().await {
            if let Event::Crossfade(action) = event {
                handle_incoming_event(action, &scheduler).await;

                if scheduler.read().await.is_disposed() {
                    break;
                }
            }
        }
    });
}

pub async fn handle_incoming_event(action: CrossfadeAction, scheduler: &SharedScheduler) {
    let mut scheduler = scheduler.write().await;

    match action {
        CrossfadeAction::SetTarget {
            track,
            volume,
            duration,
        } => {
            let outcome = scheduler.set_target(&track, volume, duration);
            debug!("Ambient target {track}: {outcome:?}");
        }
        CrossfadeAction::SetVolume(volume) => scheduler.set_volume(volume),
        CrossfadeAction::SetActive { active, fade } => {
            if let Err(e) = scheduler.set_active(active, fade) {
                warn!("Could not resume ambient audio: {e:#}");
            }
        }
        CrossfadeAction::SlotLoaded {
            slot,
            ticket,
            result,
        } => {
            if let Err(e) = scheduler.on_slot_loaded(slot, ticket, result) {
                warn!("Ambient track did not start: {e:#}");
            }
        }
        CrossfadeAction::Dispose => scheduler.dispose(),
        CrossfadeAction::TransitionComplete { .. } | CrossfadeAction::PlaybackRejected { .. } => {}
    }
}
