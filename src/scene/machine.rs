use crate::{
    backend::{GenerationBackend, VoiceId},
    config::Config,
    crossfade::CrossfadeAction,
    event::{Event, EventBus},
    narration::NarrationAction,
    scene::{
        record::{GenerationOutcome, RequestTicket, ResourceKind, ResourceStatus, SceneRecord},
        split::split_scenes,
    },
    sentiment::TrackTable,
};
use std::{sync::Arc, time::Duration};
use tokio::sync::RwLock;

#[derive(Clone, Debug)]
pub enum SceneAction {
    /// Generate a new story and play it
    RequestStory { prompt: String },

    /// A complete story text arrived
    ScriptReceived { text: String },

    NavigateNext,

    NavigatePrev,

    /// Jump to a scene, subject to the same guard as next/prev
    GoTo { index: usize },

    RequestImage { index: usize },

    RequestAudio { index: usize },

    /// User-initiated retry, `None` targets the current scene
    RetryImage { index: Option<usize> },

    /// User-initiated (re)generation of narration, `None` targets the current scene
    RetryAudio { index: Option<usize> },

    /// Image generation finished for scene `index` of script `epoch`
    ImageResolved {
        epoch: u64,
        index: usize,
        outcome: GenerationOutcome,
    },

    /// Narration generation finished for scene `index` of script `epoch`
    AudioResolved {
        epoch: u64,
        index: usize,
        outcome: GenerationOutcome,
    },

    /// Steady ambient volume for this and every following scene
    SetAmbientVolume { volume: f32 },

    /// Notification that the current scene changed
    SceneChanged { index: usize, text: String },

    /// Notification that the current scene's image resolved
    VisualReady { index: usize },

    /// Notification that a navigation attempt was refused
    NavigationBlocked { index: usize },
}

#[derive(Clone, Debug)]
pub struct SceneSettings {
    pub voice: VoiceId,
    pub prefetch_next: bool,
    /// Ambient volume requested for every scene
    pub volume: f32,
    /// Crossfade duration used on scene changes
    pub crossfade: Duration,
    pub tracks: TrackTable,
}

impl Default for SceneSettings {
    fn default() -> Self {
        Self {
            voice: VoiceId::default(),
            prefetch_next: true,
            volume: 0.2,
            crossfade: Duration::from_millis(1500),
            tracks: TrackTable::default(),
        }
    }
}

impl From<&Config> for SceneSettings {
    fn from(config: &Config) -> Self {
        Self {
            voice: VoiceId::resolve(config.voice_id.as_deref()),
            prefetch_next: config.scenes.prefetch_next,
            volume: config.audio.volume,
            crossfade: config.audio.scene_crossfade(),
            tracks: config.tracks.clone(),
        }
    }
}

fn image_prompt(text: &str) -> String {
    format!("Storybook illustration, no text or lettering. Scene: {text}")
}

/// Owns the scene list and decides when media is requested, when narration
/// may start and when navigation is allowed.
///
/// The scene list is only ever replaced as a whole: readers hold an
/// `Arc` snapshot that never changes underneath them.
pub struct SceneMachine {
    scenes: Arc<Vec<SceneRecord>>,
    current: usize,
    /// Bumped for every new script, stale generation results are dropped
    epoch: u64,
    /// Narration autoplay already fired for the current scene entry
    narration_started: bool,
    settings: SceneSettings,
    backend: Arc<dyn GenerationBackend>,
    bus: EventBus,
}

impl SceneMachine {
    pub fn new(settings: SceneSettings, backend: Arc<dyn GenerationBackend>, bus: &EventBus) -> Self {
        Self {
            scenes: Arc::new(Vec::new()),
            current: 0,
            epoch: 0,
            narration_started: false,
            settings,
            backend,
            bus: bus.clone(),
        }
    }

    pub fn snapshot(&self) -> Arc<Vec<SceneRecord>> {
        self.scenes.clone()
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    pub fn current_index(&self) -> Option<usize> {
        (!self.scenes.is_empty()).then_some(self.current)
    }

    pub fn current_scene(&self) -> Option<&SceneRecord> {
        self.scenes.get(self.current)
    }

    pub fn settings(&self) -> &SceneSettings {
        &self.settings
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Whether narration of the current scene may play
    pub fn visual_ready(&self) -> bool {
        self.current_scene().is_some_and(|scene| scene.visual_ready)
    }

    pub fn is_nav_blocked(&self, target: usize) -> bool {
        self.scenes
            .get(target)
            .is_some_and(SceneRecord::blocks_navigation)
    }

    /// Copy-on-write update of one record
    fn update(&mut self, index: usize, f: impl FnOnce(&mut SceneRecord)) -> bool {
        match Arc::make_mut(&mut self.scenes).get_mut(index) {
            Some(record) => {
                f(record);
                true
            }
            None => false,
        }
    }

    pub fn request_story(&self, prompt: String) {
        let backend = self.backend.clone();
        let bus = self.bus.clone();

        info!("Requesting a new story");
        tokio::spawn(async move {
            match backend.generate_story(&prompt).await {
                Ok(text) => bus.send(Event::Scene(SceneAction::ScriptReceived { text })),
                Err(e) => error!("Story generation failed: {e:#}"),
            }
        });
    }

    pub fn on_script_received(&mut self, text: &str) {
        let records: Vec<SceneRecord> = split_scenes(text)
            .into_iter()
            .map(SceneRecord::new)
            .collect();

        self.epoch += 1;
        self.scenes = Arc::new(records);
        self.current = 0;
        self.narration_started = false;

        info!(
            "Received script with {} scenes (epoch {})",
            self.scenes.len(),
            self.epoch
        );

        if self.scenes.is_empty() {
            warn!("Script contained no scenes");
            return;
        }

        self.enter_current();
    }

    /// Makes `index` the current scene without consulting the navigation
    /// guard.
    pub fn on_scene_index_change(&mut self, index: usize) -> bool {
        if index >= self.scenes.len() {
            warn!(
                "Ignoring change to scene {index}, only {} scenes",
                self.scenes.len()
            );
            return false;
        }

        info!("Entering scene {index}");
        self.current = index;
        self.enter_current();
        true
    }

    fn enter_current(&mut self) {
        let index = self.current;
        self.narration_started = false;
        self.bus.send(Event::Narration(NarrationAction::Stop));

        // The gate closes on entry and reopens at once if the image already resolved
        self.update(index, |record| {
            record.visual_ready = record.image_status.is_resolved();
        });

        let text = self.scenes[index].text().to_string();
        self.bus.send(Event::Scene(SceneAction::SceneChanged {
            index,
            text: text.clone(),
        }));
        self.drive_ambient(&text);

        self.request_image(index);
        self.request_audio(index);
        if self.settings.prefetch_next {
            self.request_image(index + 1);
        }

        if self.scenes[index].visual_ready {
            self.bus
                .send(Event::Scene(SceneAction::VisualReady { index }));
        }
        self.try_autoplay();
    }

    pub fn set_ambient_volume(&mut self, volume: f32) {
        self.settings.volume = volume.clamp(0.0, 1.0);
        info!("Ambient volume {:.2}", self.settings.volume);
        self.bus
            .send(Event::Crossfade(CrossfadeAction::SetVolume(self.settings.volume)));
    }

    fn drive_ambient(&self, text: &str) {
        let (category, track) = self.settings.tracks.track_for_text(text);
        debug!("Scene mood {category}, ambient track {track}");

        self.bus.send(Event::Crossfade(CrossfadeAction::SetTarget {
            track: track.to_string(),
            volume: self.settings.volume,
            duration: Some(self.settings.crossfade),
        }));
    }

    pub fn navigate_next(&mut self) -> bool {
        match self.current_index() {
            Some(current) => self.navigate_to(current + 1),
            None => false,
        }
    }

    pub fn navigate_prev(&mut self) -> bool {
        match self.current_index().and_then(|current| current.checked_sub(1)) {
            Some(target) => self.navigate_to(target),
            None => false,
        }
    }

    /// Guarded navigation: refused while the target's first image request
    /// is still in flight.
    pub fn navigate_to(&mut self, target: usize) -> bool {
        if target >= self.scenes.len() || target == self.current {
            return false;
        }

        if self.is_nav_blocked(target) {
            info!("Navigation to scene {target} blocked, image still generating");
            self.bus
                .send(Event::Scene(SceneAction::NavigationBlocked { index: target }));
            return false;
        }

        self.on_scene_index_change(target)
    }

    pub fn request_image(&mut self, index: usize) -> bool {
        self.request(ResourceKind::Image, index, false)
    }

    pub fn request_audio(&mut self, index: usize) -> bool {
        self.request(ResourceKind::Narration, index, false)
    }

    pub fn retry_image(&mut self, index: usize) -> bool {
        self.request(ResourceKind::Image, index, true)
    }

    pub fn retry_audio(&mut self, index: usize) -> bool {
        self.request(ResourceKind::Narration, index, true)
    }

    /// Issues a generation request unless one is pending. Automatic
    /// requests only start from Idle, retries only from Failed (or Idle for
    /// narration, which doubles as the "generate narration" control).
    fn request(&mut self, kind: ResourceKind, index: usize, retry: bool) -> bool {
        let Some(record) = self.scenes.get(index) else {
            return false;
        };

        if record.ticket(kind) == RequestTicket::Pending {
            debug!("{kind:?} for scene {index} already in flight");
            return false;
        }

        let status = record.status(kind);
        let allowed = match (retry, kind) {
            (false, _) => status == ResourceStatus::Idle,
            (true, ResourceKind::Image) => status == ResourceStatus::Failed,
            (true, ResourceKind::Narration) => {
                matches!(status, ResourceStatus::Failed | ResourceStatus::Idle)
            }
        };
        if !allowed {
            return false;
        }

        let text = record.text().to_string();
        self.update(index, |record| record.begin_request(kind));
        self.spawn_generation(kind, index, text);
        true
    }

    fn spawn_generation(&self, kind: ResourceKind, index: usize, text: String) {
        let backend = self.backend.clone();
        let bus = self.bus.clone();
        let voice = self.settings.voice.clone();
        let epoch = self.epoch;

        debug!("Requesting {kind:?} for scene {index}");

        tokio::spawn(async move {
            let action = match kind {
                ResourceKind::Image => SceneAction::ImageResolved {
                    epoch,
                    index,
                    outcome: backend.generate_image(&image_prompt(&text)).await.into(),
                },
                ResourceKind::Narration => SceneAction::AudioResolved {
                    epoch,
                    index,
                    outcome: backend.generate_audio(&text, &voice).await.into(),
                },
            };
            bus.send(Event::Scene(action));
        });
    }

    pub fn on_image_resolved(&mut self, epoch: u64, index: usize, outcome: GenerationOutcome) -> bool {
        self.on_resolved(ResourceKind::Image, epoch, index, outcome)
    }

    pub fn on_audio_resolved(&mut self, epoch: u64, index: usize, outcome: GenerationOutcome) -> bool {
        self.on_resolved(ResourceKind::Narration, epoch, index, outcome)
    }

    /// Writes a generation result into its record by index, whether or not
    /// that scene is current.
    fn on_resolved(
        &mut self,
        kind: ResourceKind,
        epoch: u64,
        index: usize,
        outcome: GenerationOutcome,
    ) -> bool {
        if epoch != self.epoch {
            debug!("Dropping {kind:?} result for scene {index} of replaced script {epoch}");
            return false;
        }

        match self.scenes.get(index) {
            Some(record) if record.ticket(kind) == RequestTicket::Pending => {}
            _ => {
                debug!("Dropping unexpected {kind:?} result for scene {index}");
                return false;
            }
        }

        match &outcome {
            GenerationOutcome::Ready(url) => info!("{kind:?} ready for scene {index}: {url}"),
            GenerationOutcome::Failed(e) => warn!("{kind:?} failed for scene {index}: {e}"),
        }

        self.update(index, |record| record.resolve(kind, outcome));

        if index == self.current {
            if kind == ResourceKind::Image {
                self.bus
                    .send(Event::Scene(SceneAction::VisualReady { index }));
            }
            self.try_autoplay();
        }
        true
    }

    /// Starts narration once per scene entry, as soon as both the clip and
    /// the visual gate are ready.
    fn try_autoplay(&mut self) {
        if self.narration_started {
            return;
        }
        let Some(record) = self.scenes.get(self.current) else {
            return;
        };
        if !record.visual_ready || record.narration_status != ResourceStatus::Ready {
            return;
        }
        let Some(url) = record.narration_ref.clone() else {
            return;
        };

        self.narration_started = true;
        info!("Starting narration for scene {}", self.current);
        self.bus.send(Event::Narration(NarrationAction::Load {
            index: self.current,
            url,
            autoplay: true,
        }));
    }
}

/// Type alias for the shared scene machine
pub type SharedSceneMachine = Arc<RwLock<SceneMachine>>;

pub fn init(
    bus: &EventBus,
    settings: SceneSettings,
    backend: Arc<dyn GenerationBackend>,
) -> SharedSceneMachine {
    let machine = Arc::new(RwLock::new(SceneMachine::new(settings, backend, bus)));

    handle_incoming_event_loop(bus.clone(), machine.clone());

    machine
}

fn handle_incoming_event_loop(bus: EventBus, machine: SharedSceneMachine) {
    tokio::spawn(async move {
        let mut bus_rx = bus.subscribe();

        while let Some(event) = bus_rx.recv().await {
            if let Event::Scene(action) = event {
                handle_incoming_event(action, &machine).await;
            }
        }
    });
}

pub async fn handle_incoming_event(action: SceneAction, machine: &SharedSceneMachine) {
    let mut machine = machine.write().await;

    match action {
        SceneAction::RequestStory { prompt } => machine.request_story(prompt),
        SceneAction::ScriptReceived { text } => machine.on_script_received(&text),
        SceneAction::NavigateNext => {
            machine.navigate_next();
        }
        SceneAction::NavigatePrev => {
            machine.navigate_prev();
        }
        SceneAction::GoTo { index } => {
            machine.navigate_to(index);
        }
        SceneAction::RequestImage { index } => {
            machine.request_image(index);
        }
        SceneAction::RequestAudio { index } => {
            machine.request_audio(index);
        }
        SceneAction::RetryImage { index } => {
            let index = index.unwrap_or(machine.current);
            if !machine.retry_image(index) {
                debug!("Nothing to retry for image of scene {index}");
            }
        }
        SceneAction::RetryAudio { index } => {
            let index = index.unwrap_or(machine.current);
            if !machine.retry_audio(index) {
                debug!("Nothing to retry for narration of scene {index}");
            }
        }
        SceneAction::SetAmbientVolume { volume } => machine.set_ambient_volume(volume),
        SceneAction::ImageResolved {
            epoch,
            index,
            outcome,
        } => {
            machine.on_image_resolved(epoch, index, outcome);
        }
        SceneAction::AudioResolved {
            epoch,
            index,
            outcome,
        } => {
            machine.on_audio_resolved(epoch, index, outcome);
        }
        SceneAction::SceneChanged { .. }
        | SceneAction::VisualReady { .. }
        | SceneAction::NavigationBlocked { .. } => {}
    }
}
