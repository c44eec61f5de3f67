//! Keyboard control when running in a terminal.

use crate::{
    crossfade::CrossfadeAction,
    debounce::Debouncer,
    event::{Event, EventBus},
    narration::NarrationAction,
    scene::SceneAction,
};
use std::{io::Read, time::Duration};
use tokio::sync::mpsc;

const VOLUME_STEP: f32 = 0.05;

pub struct Controls {
    bus: EventBus,
    volume: f32,
    ambient_active: bool,
    volume_debouncer: Debouncer<f32>,
}

impl Controls {
    pub fn new(bus: &EventBus, volume: f32, debounce: Duration) -> Self {
        let commit_bus = bus.clone();
        let volume_debouncer = Debouncer::new(debounce, move |volume| {
            commit_bus.send(Event::Scene(SceneAction::SetAmbientVolume { volume }));
        });

        Self {
            bus: bus.clone(),
            volume,
            ambient_active: true,
            volume_debouncer,
        }
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    fn nudge_volume(&mut self, delta: f32) {
        self.volume = (self.volume + delta).clamp(0.0, 1.0);
        self.volume_debouncer.push(self.volume);
    }

    /// Handles one key press. Returns false when the user asked to quit.
    pub fn handle_key(&mut self, key: u8) -> bool {
        match key {
            b'n' => self.bus.send(Event::Scene(SceneAction::NavigateNext)),
            b'p' => self.bus.send(Event::Scene(SceneAction::NavigatePrev)),
            b' ' => self.bus.send(Event::Narration(NarrationAction::TogglePlay)),
            b'+' => self.nudge_volume(VOLUME_STEP),
            b'-' => self.nudge_volume(-VOLUME_STEP),
            b'i' => self
                .bus
                .send(Event::Scene(SceneAction::RetryImage { index: None })),
            b'a' => self
                .bus
                .send(Event::Scene(SceneAction::RetryAudio { index: None })),
            b'm' => {
                self.ambient_active = !self.ambient_active;
                self.bus.send(Event::Crossfade(CrossfadeAction::SetActive {
                    active: self.ambient_active,
                    fade: None,
                }));
            }
            b'q' => {
                info!("Quit requested");
                self.bus.send(Event::Shutdown);
                return false;
            }
            _ => {}
        }
        true
    }
}

pub fn start(bus: &EventBus, volume: f32, debounce: Duration) {
    let (tx, mut rx) = mpsc::channel::<u8>(16);

    // Plain thread: a blocked stdin read must not hold up runtime shutdown
    std::thread::spawn(move || {
        for byte in std::io::stdin().lock().bytes() {
            match byte {
                Ok(byte) => {
                    if tx.blocking_send(byte).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Could not read stdin: {e}");
                    break;
                }
            }
        }
    });

    let mut controls = Controls::new(bus, volume, debounce);
    tokio::spawn(async move {
        while let Some(key) = rx.recv().await {
            if !controls.handle_key(key) {
                break;
            }
        }
    });
}
