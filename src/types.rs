//! Shared data model for the control core.
//!
//! Types here carry no behavior beyond construction and light validation
//! helpers; the algorithms that operate on them live in their owning
//! modules ([`crate::planner`], [`crate::avsync`], [`crate::lipsync`],
//! [`crate::drift`], [`crate::persona`], [`crate::viseme`],
//! [`crate::quality`]).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A sequenced run of mono float samples in `[-1, 1]`.
///
/// Invariant: `t1_ms - t0_ms == samples.len() / sample_rate_hz * 1000`
/// within 1 microsecond. Produced by a TTS provider adapter, consumed by
/// the master clock, the scorer, and the delivery sink.
#[derive(Debug, Clone)]
pub struct PcmChunk {
    pub samples: Vec<f32>,
    pub sample_rate_hz: u32,
    pub sequence: u64,
    pub t0_ms: f64,
    pub t1_ms: f64,
}

impl PcmChunk {
    /// Expected `t1_ms` given `t0_ms`, `samples.len()`, and `sample_rate_hz`.
    pub fn expected_t1_ms(&self) -> f64 {
        self.t0_ms + (self.samples.len() as f64 / self.sample_rate_hz as f64) * 1000.0
    }

    /// Whether the chunk's declared interval matches its sample count
    /// within 1 microsecond (0.001 ms).
    pub fn interval_is_consistent(&self) -> bool {
        (self.t1_ms - self.expected_t1_ms()).abs() <= 0.001
    }
}

/// The 20-symbol normalized viseme set used throughout the aligner.
pub const NORMALIZED_VISEMES: [&str; 20] = [
    "SIL", "AA", "AE", "AH", "AO", "EH", "ER", "IH", "IY", "OW", "UH", "UW", "BMP", "FV", "L",
    "WQ", "CHJSH", "TH", "TDK", "S",
];

/// A single viseme event on a timeline.
///
/// Invariant: `start_ms <= end_ms`. Events in a timeline are sorted by
/// `start_ms` and non-overlapping after [`crate::viseme::merge_adjacent_visemes`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisemeEvent {
    pub start_ms: f64,
    pub end_ms: f64,
    pub viseme_id: String,
    pub confidence: f64,
}

/// Camera framing mode for a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CameraMode {
    #[serde(rename = "A_SELFIE")]
    ASelfie,
    #[serde(rename = "B_MIRROR")]
    BMirror,
    #[serde(rename = "C_CUTAWAY")]
    CCutaway,
}

impl Default for CameraMode {
    fn default() -> Self {
        Self::ASelfie
    }
}

/// Playback/speaking state for one actor-timeline entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorState {
    Listening,
    Speaking,
}

/// One entry in a turn plan's actor timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorTimelineEntry {
    pub t0: f64,
    pub t1: f64,
    pub state: ActorState,
    pub emotion: String,
    pub intensity: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gaze_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blink_rate: Option<f64>,
}

/// One prioritized speech segment in a turn plan.
///
/// Invariant: `priority` 0 is highest; `text` is non-empty; `est_sec >= 0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnSegment {
    pub priority: u32,
    pub text: String,
    pub est_sec: f64,
}

/// A bounded, prioritized speech plan for one turn.
///
/// Invariants: `0 < target_sec <= hardcap_sec`; `segments` sorted by
/// ascending priority; `hardcap_sec` equals the process-wide configured
/// hardcap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnPlan {
    pub target_sec: f64,
    pub hardcap_sec: f64,
    pub segments: Vec<TurnSegment>,
    pub actor_timeline: Vec<ActorTimelineEntry>,
    pub camera_mode: CameraMode,
}

/// Metadata attached to a single persona anchor image.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnchorMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression_tag: Option<String>,
    #[serde(default)]
    pub best_for: Vec<String>,
}

/// A single reference image usable to condition face rendering for a turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anchor {
    pub image_ref: String,
    #[serde(default)]
    pub metadata: AnchorMetadata,
}

/// Min/max intensity range allowed for one emotion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EmotionRange {
    pub min: f64,
    pub max: f64,
}

/// Behavior policy governing which emotions (and at what intensity) a
/// persona may express.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BehaviorPolicy {
    #[serde(default)]
    pub allowed_emotions: Vec<String>,
    #[serde(default)]
    pub emotion_ranges: HashMap<String, EmotionRange>,
}

/// Identity reference embeddings for a persona.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersonaIdentity {
    #[serde(default)]
    pub face_embedding_refs: Vec<String>,
}

/// A persona's identity, style, behavior policy, and anchor sets.
///
/// Invariants: each anchor set is non-empty; `persona_id` and `version`
/// are non-empty strings; `version` is unique within a persona (enforced
/// by [`crate::persona::PersonaRegistry`], not by this type alone).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaPack {
    pub persona_id: String,
    pub version: String,
    #[serde(default)]
    pub identity: PersonaIdentity,
    #[serde(default)]
    pub style: String,
    #[serde(default)]
    pub behavior_policy: BehaviorPolicy,
    pub anchor_sets: HashMap<String, Vec<Anchor>>,
}

/// Crop rectangle plus the affine mapping source pixels into a normalized
/// tile.
///
/// Invariant: after smoothing, `normalized_size` is preserved across
/// frames.
#[derive(Debug, Clone, Copy)]
pub struct RoiTransform {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
    /// Row-major 2x3 affine matrix mapping source pixels to the
    /// normalized tile.
    pub affine: [f64; 6],
    pub normalized_size: (u32, u32),
}

/// Discrete evaluation outcome of a measured signal against thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Band {
    Ok,
    Warn,
    Fail,
    Ignore,
}

/// Lip-sync label for a scored window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LipSyncLabel {
    Ok,
    Warn,
    Fail,
    Silence,
    Occluded,
    Unknown,
}

/// Result of scoring one lip-sync window.
///
/// `score` is `None` iff `label` is silence/occluded/unknown-by-low-confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LipSyncScore {
    pub window_id: String,
    pub score: Option<f64>,
    pub offset_ms: Option<f64>,
    pub confidence: f64,
    pub label: LipSyncLabel,
}

/// Identity/background/flicker scoring result for one frame pair.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DriftSignal {
    pub identity_similarity: f64,
    pub bg_similarity: f64,
    pub flicker_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pose_jitter: Option<f64>,
}

/// Transport/render health for the current session.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PlaybackHealth {
    /// Video-minus-audio presentation-time difference, in ms. Positive
    /// means video is ahead.
    pub av_offset_ms: f64,
    pub late_video_frames_per_s: f64,
    pub jitter_buffer_ms: f64,
}

/// Per-session controller state, mutated only by
/// [`crate::quality::decide`].
#[derive(Debug, Clone, Default)]
pub struct ControllerState {
    pub lip_fail_streak: u32,
    pub lip_ok_streak: u32,
    pub drift_fail_streak: u32,
    pub overall_ok_streak: u32,
    pub degrade_level: u8,
    pub last_heavy_action_ms: Option<f64>,
}
