use crate::sentiment::TrackTable;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};
use tokio::fs::read_to_string;

pub const CONFIG_FILE: &str = "Config.toml";

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AudioConfig {
    /// Steady-state ambient volume
    #[serde(default = "default_volume")]
    pub volume: f32,

    /// Crossfade duration when the scheduler is driven directly
    #[serde(default = "default_crossfade_ms")]
    pub crossfade_ms: u64,

    /// Crossfade duration used for scene changes
    #[serde(default = "default_scene_crossfade_ms")]
    pub scene_crossfade_ms: u64,

    /// Fade to silence when ambient audio is deactivated
    #[serde(default = "default_crossfade_ms")]
    pub deactivate_fade_ms: u64,

    /// Ramp update interval
    #[serde(default = "default_frame_ms")]
    pub frame_ms: u64,

    /// Quiet period before a volume change is committed
    #[serde(default = "default_volume_debounce_ms")]
    pub volume_debounce_ms: u64,

    /// Address the WAV stream of the mix is served on
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

fn default_volume() -> f32 {
    0.2
}

fn default_crossfade_ms() -> u64 {
    2000
}

fn default_scene_crossfade_ms() -> u64 {
    1500
}

fn default_frame_ms() -> u64 {
    16
}

fn default_volume_debounce_ms() -> u64 {
    100
}

fn default_listen_addr() -> String {
    "127.0.0.1:7878".to_string()
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            volume: default_volume(),
            crossfade_ms: default_crossfade_ms(),
            scene_crossfade_ms: default_scene_crossfade_ms(),
            deactivate_fade_ms: default_crossfade_ms(),
            frame_ms: default_frame_ms(),
            volume_debounce_ms: default_volume_debounce_ms(),
            listen_addr: default_listen_addr(),
        }
    }
}

impl AudioConfig {
    pub fn crossfade(&self) -> Duration {
        Duration::from_millis(self.crossfade_ms)
    }

    pub fn scene_crossfade(&self) -> Duration {
        Duration::from_millis(self.scene_crossfade_ms)
    }

    pub fn deactivate_fade(&self) -> Duration {
        Duration::from_millis(self.deactivate_fade_ms)
    }

    pub fn frame(&self) -> Duration {
        // A zero interval would make tokio::time::interval panic
        Duration::from_millis(self.frame_ms.max(1))
    }

    pub fn volume_debounce(&self) -> Duration {
        Duration::from_millis(self.volume_debounce_ms)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ScenesConfig {
    /// Request the next scene's image as soon as a scene is entered
    #[serde(default = "default_prefetch_next")]
    pub prefetch_next: bool,
}

fn default_prefetch_next() -> bool {
    true
}

impl Default for ScenesConfig {
    fn default() -> Self {
        Self {
            prefetch_next: default_prefetch_next(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Config {
    /// Base URL of the generate-story/-image/-audio endpoints
    #[serde(default = "default_backend_url")]
    pub backend_url: String,

    /// Narration voice, falls back to a fixed voice when invalid or absent
    #[serde(default)]
    pub voice_id: Option<String>,

    /// Prompt sent to generate-story on startup
    #[serde(default = "default_story_prompt")]
    pub story_prompt: String,

    #[serde(default)]
    pub audio: AudioConfig,

    #[serde(default)]
    pub scenes: ScenesConfig,

    #[serde(default)]
    pub tracks: TrackTable,
}

fn default_backend_url() -> String {
    "http://127.0.0.1:3000/api".to_string()
}

fn default_story_prompt() -> String {
    "A short bedtime story about a lighthouse keeper and a lost whale.".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: default_backend_url(),
            voice_id: None,
            story_prompt: default_story_prompt(),
            audio: AudioConfig::default(),
            scenes: ScenesConfig::default(),
            tracks: TrackTable::default(),
        }
    }
}

impl Config {
    fn normalized(mut self) -> Self {
        self.audio.volume = self.audio.volume.clamp(0.0, 1.0);
        self.backend_url = self.backend_url.trim_end_matches('/').to_string();
        self
    }
}

pub fn parse(contents: &str) -> Result<Config> {
    let config: Config = toml::from_str(contents).context("Invalid configuration")?;
    Ok(config.normalized())
}

pub async fn load_from(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    let contents = read_to_string(path)
        .await
        .with_context(|| format!("Could not read {}", path.display()))?;

    parse(&contents)
}

pub async fn load() -> Result<Config> {
    load_from(CONFIG_FILE).await
}
