//! storyreel library crate
//!
//! This module exposes internal types for integration testing.
//! The main binary is in main.rs.

#[macro_use]
extern crate log;

pub mod backend;
pub mod buffer;
pub mod config;
pub mod constants;
pub mod crossfade;
pub mod debounce;
pub mod event;
pub mod mixer;
pub mod narration;
pub mod net;
pub mod scene;
pub mod sentiment;
pub mod sources;
pub mod stdin;

#[cfg(test)]
mod debounce_tests;
#[cfg(test)]
mod mixer_tests;
