//! Real-time control core for a conversational talking-head streaming system.
//!
//! This crate paces an audio+video stream for a single conversational turn
//! while continuously measuring lip-sync, identity drift, and playback
//! health, and reacts through a bounded, hysteresis-aware action policy.
//!
//! # Architecture
//!
//! - [`planner`] turns a user message into a bounded [`types::TurnPlan`].
//! - [`avsync`] is the single source of truth for media timestamps
//!   ([`avsync::AudioMasterClock`]) and pacing/late-frame decisions.
//! - [`lipsync`] scores windowed correlation between an audio envelope and
//!   a mouth-open trajectory.
//! - [`drift`] scores identity/background similarity and flicker.
//! - [`persona`] selects and refreshes the face anchor used to render a
//!   turn.
//! - [`viseme`] converts phonemes into a merged viseme timeline.
//! - [`quality`] is the central state machine consuming all of the above
//!   and emitting recovery actions.
//! - [`providers`] and [`session`] are the boundary: provider adapters,
//!   PCM/WAV plumbing, and the cooperative per-session executor.

pub mod avsync;
pub mod config;
pub mod drift;
pub mod error;
pub mod lipsync;
pub mod persona;
pub mod planner;
pub mod providers;
pub mod quality;
pub mod session;
pub mod types;
pub mod viseme;

pub use config::CoreConfig;
pub use error::{CoreError, Result};
