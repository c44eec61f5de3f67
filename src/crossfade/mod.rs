//! Ambient background music with gapless crossfades between two slots.

pub mod ramp;
pub mod scheduler;
pub mod slot;

pub use scheduler::{
    init, start, CrossfadeAction, CrossfadeConfig, CrossfadeScheduler, SharedScheduler, TargetOutcome,
};
pub use slot::{AudioSlot, PlaybackState, SlotId, SlotOutput};
