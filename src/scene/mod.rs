//! Story scenes: splitting a script into scenes, the per-scene media state
//! and the machine that sequences requests, narration and navigation.

mod machine;
mod record;
mod split;

pub use machine::{
    handle_incoming_event, init, SceneAction, SceneMachine, SceneSettings, SharedSceneMachine,
};
pub use record::{GenerationOutcome, RequestTicket, ResourceKind, ResourceStatus, SceneRecord};
pub use split::split_scenes;
