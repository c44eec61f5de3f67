//! Test infrastructure for storyreel integration tests.
//!
//! Provides a scripted generation backend, a recording slot output,
//! event collection helpers and audio fixtures.

#![allow(dead_code)]

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use hound::{SampleFormat, WavSpec, WavWriter};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast::error::TryRecvError;

// Re-export key types from the main crate
pub use storyreel::backend::{GenerationBackend, VoiceId};
pub use storyreel::config::Config;
pub use storyreel::crossfade::{CrossfadeAction, SlotId, SlotOutput};
pub use storyreel::event::{Event, EventBus, Subscriber};
pub use storyreel::narration::NarrationAction;
pub use storyreel::scene::{GenerationOutcome, ResourceStatus, SceneAction, SceneSettings};

/// How the scripted backend answers one kind of request
#[derive(Clone, Debug)]
pub enum Reply {
    /// Succeed with `{prefix}{n}` where n counts calls of this kind
    Numbered(String),
    /// Succeed with a fixed locator
    Fixed(String),
    Fail,
    /// Never answer
    Stall,
}

#[derive(Debug)]
struct Script {
    image: Reply,
    audio: Reply,
    story: Reply,
    delay: Duration,
}

/// Generation backend answering from a script and recording every call.
pub struct FakeBackend {
    script: Mutex<Script>,
    calls: Mutex<Vec<String>>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(Script {
                image: Reply::Numbered("https://img.test/".to_string()),
                audio: Reply::Numbered("https://audio.test/".to_string()),
                story: Reply::Fixed("Sentence one. Sentence two.".to_string()),
                delay: Duration::ZERO,
            }),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn set_image(&self, reply: Reply) {
        self.script.lock().unwrap().image = reply;
    }

    pub fn set_audio(&self, reply: Reply) {
        self.script.lock().unwrap().audio = reply;
    }

    pub fn set_story(&self, reply: Reply) {
        self.script.lock().unwrap().story = reply;
    }

    /// Latency added to every answer
    pub fn set_delay(&self, delay: Duration) {
        self.script.lock().unwrap().delay = delay;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.calls().iter().filter(|call| call.starts_with(kind)).count()
    }

    async fn answer(&self, kind: &str, input: &str) -> Result<String> {
        let (reply, delay, n) = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(format!("{kind}:{input}"));
            let n = calls.iter().filter(|call| call.starts_with(kind)).count() - 1;

            let script = self.script.lock().unwrap();
            let reply = match kind {
                "image" => script.image.clone(),
                "audio" => script.audio.clone(),
                _ => script.story.clone(),
            };
            (reply, script.delay, n)
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match reply {
            Reply::Numbered(prefix) => Ok(format!("{prefix}{n}")),
            Reply::Fixed(value) => Ok(value),
            Reply::Fail => Err(anyhow!("{kind} generation failed")),
            Reply::Stall => std::future::pending().await,
        }
    }
}

#[async_trait]
impl GenerationBackend for FakeBackend {
    async fn generate_image(&self, prompt: &str) -> Result<String> {
        self.answer("image", prompt).await
    }

    async fn generate_audio(&self, text: &str, _voice: &VoiceId) -> Result<String> {
        self.answer("audio", text).await
    }

    async fn generate_story(&self, prompt: &str) -> Result<String> {
        self.answer("story", prompt).await
    }
}

/// Everything a recording slot output was asked to do
#[derive(Debug, Default)]
pub struct OutputLog {
    pub loads: Vec<(String, u64)>,
    pub plays: usize,
    pub pauses: usize,
    pub resets: usize,
    pub volume: f32,
    pub reject: bool,
}

pub type SharedLog = Arc<Mutex<OutputLog>>;

/// Slot output that records calls and completes loads via the bus
pub struct RecordingOutput {
    pub slot: SlotId,
    pub log: SharedLog,
    pub bus: EventBus,
}

impl RecordingOutput {
    pub fn new(slot: SlotId, bus: &EventBus) -> (Box<Self>, SharedLog) {
        let log = SharedLog::default();
        let output = Box::new(Self {
            slot,
            log: log.clone(),
            bus: bus.clone(),
        });
        (output, log)
    }
}

impl SlotOutput for RecordingOutput {
    fn load(&mut self, track: &str, ticket: u64) {
        self.log
            .lock()
            .unwrap()
            .loads
            .push((track.to_string(), ticket));

        let result = if track.contains("missing") {
            Err(format!("{track} not found"))
        } else {
            Ok(())
        };
        self.bus.send(Event::Crossfade(CrossfadeAction::SlotLoaded {
            slot: self.slot,
            ticket,
            result,
        }));
    }

    fn play(&mut self) -> Result<()> {
        let mut log = self.log.lock().unwrap();
        if log.reject {
            bail!("playback not allowed");
        }
        log.plays += 1;
        Ok(())
    }

    fn pause(&mut self) {
        self.log.lock().unwrap().pauses += 1;
    }

    fn reset(&mut self) {
        self.log.lock().unwrap().resets += 1;
    }

    fn set_volume(&mut self, volume: f32) {
        self.log.lock().unwrap().volume = volume;
    }
}

/// Writes a stereo 48 kHz WAV file of `secs` seconds with a constant level.
pub fn write_wav(dir: &Path, name: &str, secs: f64, level: i16) -> PathBuf {
    let path = dir.join(name);
    let spec = WavSpec {
        channels: 2,
        sample_rate: 48000,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(&path, spec).unwrap();
    for _ in 0..(secs * 48000.0) as usize {
        writer.write_sample(level).unwrap();
        writer.write_sample(level).unwrap();
    }
    writer.finalize().unwrap();
    path
}

pub fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Collects all events from a subscriber within a timeout period.
/// Returns events in the order they were received.
pub async fn collect_events(subscriber: &mut Subscriber, timeout: Duration) -> Vec<Event> {
    let mut events = Vec::new();
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        match subscriber.try_recv() {
            Ok(event) => events.push(event),
            Err(TryRecvError::Empty) => {
                if tokio::time::Instant::now() >= deadline {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            Err(TryRecvError::Lagged(n)) => {
                eprintln!("Warning: subscriber lagged, missed {n} events");
            }
            Err(TryRecvError::Closed) => break,
        }
    }

    events
}

/// Collects events until a predicate is satisfied or timeout is reached.
pub async fn collect_events_until<F>(
    subscriber: &mut Subscriber,
    timeout: Duration,
    predicate: F,
) -> Vec<Event>
where
    F: Fn(&Event) -> bool,
{
    let mut events = Vec::new();
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        match subscriber.try_recv() {
            Ok(event) => {
                let should_stop = predicate(&event);
                events.push(event);
                if should_stop {
                    break;
                }
            }
            Err(TryRecvError::Empty) => {
                if tokio::time::Instant::now() >= deadline {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            Err(TryRecvError::Lagged(n)) => {
                eprintln!("Warning: subscriber lagged, missed {n} events");
            }
            Err(TryRecvError::Closed) => break,
        }
    }

    events
}

/// Waits for a specific type of event within a timeout.
pub async fn wait_for_event<F>(
    subscriber: &mut Subscriber,
    timeout: Duration,
    matches: F,
) -> Option<Event>
where
    F: Fn(&Event) -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        match subscriber.try_recv() {
            Ok(event) if matches(&event) => return Some(event),
            Ok(_) => continue,
            Err(TryRecvError::Empty) => {
                if tokio::time::Instant::now() >= deadline {
                    return None;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Closed) => return None,
        }
    }
}

/// Polls `condition` every 10 ms until it holds or `timeout` passes.
pub async fn eventually<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while !condition() {
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    true
}

/// Filters scene events.
pub fn filter_scene_events(events: &[Event]) -> Vec<&SceneAction> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::Scene(action) => Some(action),
            _ => None,
        })
        .collect()
}

/// Filters narration events.
pub fn filter_narration_events(events: &[Event]) -> Vec<&NarrationAction> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::Narration(action) => Some(action),
            _ => None,
        })
        .collect()
}

/// Filters crossfade events.
pub fn filter_crossfade_events(events: &[Event]) -> Vec<&CrossfadeAction> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::Crossfade(action) => Some(action),
            _ => None,
        })
        .collect()
}

/// Asserts that a specific event type was received.
#[macro_export]
macro_rules! assert_event_received {
    ($events:expr, $pattern:pat) => {
        assert!(
            $events.iter().any(|e| matches!(e, $pattern)),
            "Expected event matching {} not found in {:?}",
            stringify!($pattern),
            $events
        );
    };
}

/// Asserts that a specific event type was NOT received.
#[macro_export]
macro_rules! assert_event_not_received {
    ($events:expr, $pattern:pat) => {
        assert!(
            !$events.iter().any(|e| matches!(e, $pattern)),
            "Unexpected event matching {} found in {:?}",
            stringify!($pattern),
            $events
        );
    };
}
