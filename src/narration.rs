//! Narration transport: one clip at a time, loaded on request of the scene
//! machine and controlled with play/pause/seek.

use crate::{
    buffer::SharedBuffer,
    constants::SAMPLE_RATE,
    event::{Event, EventBus},
    sources::track,
};
use std::{sync::Arc, time::Duration};
use tokio::sync::RwLock;

const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Clone, Debug)]
pub enum NarrationAction {
    /// Replace the current clip with the narration of scene `index`
    Load {
        index: usize,
        url: String,
        autoplay: bool,
    },

    /// Decoder report for a load started with `ticket`
    Loaded {
        index: usize,
        ticket: u64,
        result: Result<(), String>,
    },

    Play,

    Pause,

    /// Drop the current clip, including a load still in flight
    Stop,

    TogglePlay,

    /// Jump to an absolute position in the clip
    Seek { secs: f64 },

    SetVolume(f32),

    /// Notification that playback has progressed
    Progress { index: usize, position_secs: f64 },

    /// Notification that the clip played to its end
    Ended { index: usize },
}

pub struct Narration {
    bus: EventBus,
    buffer: SharedBuffer,
    ticket: u64,
    index: Option<usize>,
    autoplay: bool,
    loaded: bool,
    playing: bool,
    volume: f32,
}

impl Narration {
    pub fn new(bus: &EventBus, buffer: SharedBuffer) -> Self {
        Self {
            bus: bus.clone(),
            buffer,
            ticket: 0,
            index: None,
            autoplay: false,
            loaded: false,
            playing: false,
            volume: 1.0,
        }
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    fn with_buffer<T>(&self, f: impl FnOnce(&mut crate::buffer::PlaybackBuffer) -> T) -> Option<T> {
        match self.buffer.lock() {
            Ok(mut buffer) => Some(f(&mut buffer)),
            Err(_) => {
                error!("Narration buffer is poisoned");
                None
            }
        }
    }

    pub fn load(&mut self, index: usize, url: String, autoplay: bool) {
        self.ticket += 1;
        self.index = Some(index);
        self.autoplay = autoplay;
        self.loaded = false;
        self.playing = false;

        let ticket = self.ticket;
        let volume = self.volume;
        self.with_buffer(|buffer| {
            buffer.begin_load(ticket);
            buffer.set_retain(true);
            buffer.set_looping(false);
            buffer.set_volume(volume);
        });

        info!("Loading narration for scene {index}");

        let bus = self.bus.clone();
        track::spawn_load(
            url,
            ticket,
            self.buffer.clone(),
            Box::new(move |result| {
                bus.send(Event::Narration(NarrationAction::Loaded {
                    index,
                    ticket,
                    result,
                }));
            }),
        );
    }

    /// Returns false when the report belongs to a superseded load.
    pub fn on_loaded(&mut self, ticket: u64, result: Result<(), String>) -> bool {
        if ticket != self.ticket {
            debug!("Ignoring stale narration load {ticket}");
            return false;
        }

        match result {
            Ok(()) => {
                self.loaded = true;
                if self.autoplay {
                    self.play();
                }
            }
            Err(e) => {
                warn!("Narration could not be loaded: {e}");
            }
        }
        true
    }

    /// Starts playback. When the clip cannot play it stays paused and the
    /// user has to start it again.
    pub fn play(&mut self) -> bool {
        if !self.loaded {
            debug!("No narration loaded");
            return false;
        }

        let started = self
            .with_buffer(|buffer| {
                if !buffer.is_playable() {
                    return false;
                }
                if buffer.is_drained() {
                    buffer.seek(0);
                }
                buffer.set_paused(false);
                true
            })
            .unwrap_or(false);

        if started {
            info!("Narration playing");
        } else {
            warn!("Narration playback rejected, waiting for user to start it");
        }
        self.playing = started;
        started
    }

    /// Pauses playback. A load still in flight no longer autoplays.
    pub fn pause(&mut self) {
        self.autoplay = false;
        self.with_buffer(|buffer| buffer.set_paused(true));
        if self.playing {
            info!("Narration paused");
        }
        self.playing = false;
    }

    /// Unloads the clip. Reports from the load in flight become stale.
    pub fn stop(&mut self) {
        self.ticket += 1;
        self.index = None;
        self.autoplay = false;
        self.loaded = false;
        self.playing = false;

        let volume = self.volume;
        self.with_buffer(|buffer| {
            buffer.reset();
            buffer.set_volume(volume);
        });
        debug!("Narration stopped");
    }

    pub fn toggle(&mut self) {
        if self.playing {
            self.pause();
        } else {
            self.play();
        }
    }

    pub fn seek(&mut self, secs: f64) {
        let position = (secs.max(0.0) * SAMPLE_RATE as f64) as usize;
        self.with_buffer(|buffer| buffer.seek(position));
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
        let volume = self.volume;
        self.with_buffer(|buffer| buffer.set_volume(volume));
    }

    /// Reports progress, and the end of the clip once the buffer drained.
    pub fn poll_progress(&mut self) {
        let Some(index) = self.index else {
            return;
        };
        if !self.playing {
            return;
        }

        let Some((position_secs, drained)) = self.with_buffer(|buffer| {
            (
                buffer.get_total_position_secs(SAMPLE_RATE),
                buffer.is_drained(),
            )
        }) else {
            return;
        };

        self.bus.send(Event::Narration(NarrationAction::Progress {
            index,
            position_secs,
        }));

        if drained {
            info!("Narration for scene {index} ended");
            self.pause();
            self.bus
                .send(Event::Narration(NarrationAction::Ended { index }));
        }
    }
}

/// Type alias for shared narration state
pub type SharedNarration = Arc<RwLock<Narration>>;

pub fn init(bus: &EventBus, buffer: SharedBuffer) -> SharedNarration {
    let narration = Arc::new(RwLock::new(Narration::new(bus, buffer)));

    handle_incoming_event_loop(bus.clone(), narration.clone());
    progress_loop(narration.clone());

    narration
}

fn progress_loop(narration: SharedNarration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PROGRESS_INTERVAL);
        loop {
            interval.tick().await;
            narration.write().await.poll_progress();
        }
    });
}

fn handle_incoming_event_loop(bus: EventBus, narration: SharedNarration) {
    tokio::spawn(async move {
        let mut bus_rx = bus.subscribe();

        while let Some(event) = bus_rx.recv().await {
            if let Event::Narration(action) = event {
                handle_incoming_event(action, &narration).await;
            }
        }
    });
}

pub async fn handle_incoming_event(action: NarrationAction, narration: &SharedNarration) {
    let mut narration = narration.write().await;

    match action {
        NarrationAction::Load {
            index,
            url,
            autoplay,
        } => narration.load(index, url, autoplay),
        NarrationAction::Loaded { ticket, result, .. } => {
            narration.on_loaded(ticket, result);
        }
        NarrationAction::Play => {
            narration.play();
        }
        NarrationAction::Pause => narration.pause(),
        NarrationAction::Stop => narration.stop(),
        NarrationAction::TogglePlay => narration.toggle(),
        NarrationAction::Seek { secs } => narration.seek(secs),
        NarrationAction::SetVolume(volume) => narration.set_volume(volume),
        NarrationAction::Progress { .. } | NarrationAction::Ended { .. } => {}
    }
}
