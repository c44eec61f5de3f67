#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResourceStatus {
    #[default]
    Idle,
    Loading,
    Ready,
    Failed,
}

impl ResourceStatus {
    /// Ready or Failed
    pub fn is_resolved(self) -> bool {
        matches!(self, ResourceStatus::Ready | ResourceStatus::Failed)
    }
}

/// Per-scene, per-resource request ticket. A new request is only issued
/// when no request is pending.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RequestTicket {
    #[default]
    NotRequested,
    Pending,
    Done,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Image,
    Narration,
}

/// Result of one generation request as carried over the event bus
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GenerationOutcome {
    Ready(String),
    Failed(String),
}

impl From<anyhow::Result<String>> for GenerationOutcome {
    fn from(result: anyhow::Result<String>) -> Self {
        match result {
            Ok(url) => GenerationOutcome::Ready(url),
            Err(e) => GenerationOutcome::Failed(format!("{e:#}")),
        }
    }
}

/// One sentence of the story and the state of its generated media.
#[derive(Clone, Debug, PartialEq)]
pub struct SceneRecord {
    text: String,
    pub image_ref: Option<String>,
    pub narration_ref: Option<String>,
    pub image_status: ResourceStatus,
    pub narration_status: ResourceStatus,
    pub image_ticket: RequestTicket,
    pub narration_ticket: RequestTicket,
    /// Last failure message, shown next to the retry control
    pub image_error: Option<String>,
    pub narration_error: Option<String>,
    /// Set by the first image resolution; retries never block navigation
    pub image_resolved_once: bool,
    /// The image resolved (either way) and narration may autoplay
    pub visual_ready: bool,
}

impl SceneRecord {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            image_ref: None,
            narration_ref: None,
            image_status: ResourceStatus::Idle,
            narration_status: ResourceStatus::Idle,
            image_ticket: RequestTicket::NotRequested,
            narration_ticket: RequestTicket::NotRequested,
            image_error: None,
            narration_error: None,
            image_resolved_once: false,
            visual_ready: false,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn status(&self, kind: ResourceKind) -> ResourceStatus {
        match kind {
            ResourceKind::Image => self.image_status,
            ResourceKind::Narration => self.narration_status,
        }
    }

    pub fn ticket(&self, kind: ResourceKind) -> RequestTicket {
        match kind {
            ResourceKind::Image => self.image_ticket,
            ResourceKind::Narration => self.narration_ticket,
        }
    }

    /// Entering this scene must wait: its first image request is in flight
    pub fn blocks_navigation(&self) -> bool {
        self.image_status == ResourceStatus::Loading && !self.image_resolved_once
    }

    pub(super) fn begin_request(&mut self, kind: ResourceKind) {
        match kind {
            ResourceKind::Image => {
                self.image_status = ResourceStatus::Loading;
                self.image_ticket = RequestTicket::Pending;
                self.image_error = None;
            }
            ResourceKind::Narration => {
                self.narration_status = ResourceStatus::Loading;
                self.narration_ticket = RequestTicket::Pending;
                self.narration_error = None;
            }
        }
    }

    pub(super) fn resolve(&mut self, kind: ResourceKind, outcome: GenerationOutcome) {
        let (status, locator, error) = match outcome {
            GenerationOutcome::Ready(url) => (ResourceStatus::Ready, Some(url), None),
            GenerationOutcome::Failed(e) => (ResourceStatus::Failed, None, Some(e)),
        };

        match kind {
            ResourceKind::Image => {
                self.image_status = status;
                self.image_ticket = RequestTicket::Done;
                self.image_error = error;
                if locator.is_some() {
                    self.image_ref = locator;
                }
                self.image_resolved_once = true;
                self.visual_ready = true;
            }
            ResourceKind::Narration => {
                self.narration_status = status;
                self.narration_ticket = RequestTicket::Done;
                self.narration_error = error;
                if locator.is_some() {
                    self.narration_ref = locator;
                }
            }
        }
    }
}
