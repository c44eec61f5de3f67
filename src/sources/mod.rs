//! Audio sources feeding the mixer.
//!
//! Everything that ends up in a [crate::buffer::PlaybackBuffer] is decoded
//! here: ambient tracks for the crossfade slots and narration clips.

pub mod track;

/// A stereo sample pair (left, right) as 16-bit signed integers.
pub type Sample = (i16, i16);

/// Output sample rate for all audio.
pub const OUTPUT_SAMPLE_RATE: u32 = crate::constants::SAMPLE_RATE;
