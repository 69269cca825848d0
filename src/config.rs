//! Typed policy records for every tunable threshold in the control core.
//!
//! Every "policy" object is a record with defaulted fields; partial TOML
//! overrides merge against the full enumeration of recognized fields via
//! `#[serde(default)]` on both the struct and each field, the same pattern
//! `SpeechConfig` uses for its nested config structs.

use serde::{Deserialize, Serialize};

/// Turn Planner budget, sourced from environment variables or defaults.
///
/// See `planner::TurnBudget::from_env` for the environment-variable names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnBudget {
    pub hardcap_sec: f64,
    pub min_target_sec: f64,
    pub default_target_min_sec: f64,
    pub default_target_max_sec: f64,
    pub tail_buffer_sec: f64,
}

impl Default for TurnBudget {
    fn default() -> Self {
        Self {
            hardcap_sec: default_hardcap_sec(),
            min_target_sec: default_min_target_sec(),
            default_target_min_sec: default_target_min_sec(),
            default_target_max_sec: default_target_max_sec(),
            tail_buffer_sec: default_tail_buffer_sec(),
        }
    }
}

fn default_hardcap_sec() -> f64 {
    10.0
}
fn default_min_target_sec() -> f64 {
    4.0
}
fn default_target_min_sec() -> f64 {
    5.0
}
fn default_target_max_sec() -> f64 {
    10.0
}
fn default_tail_buffer_sec() -> f64 {
    0.6
}

/// AV-Sync Policy Engine defaults.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AvSyncPolicy {
    pub audio_sample_rate_hz: u32,
    pub video_rtp_clock_hz: u32,
    pub target_jitter_buffer_ms: f64,
    pub max_jitter_buffer_ms: f64,
    pub late_frame_policy: LateFramePolicy,
    pub resync_threshold_ms: f64,
}

impl Default for AvSyncPolicy {
    fn default() -> Self {
        Self {
            audio_sample_rate_hz: 48_000,
            video_rtp_clock_hz: 90_000,
            target_jitter_buffer_ms: 90.0,
            max_jitter_buffer_ms: 250.0,
            late_frame_policy: LateFramePolicy::Drop,
            resync_threshold_ms: 120.0,
        }
    }
}

/// Action taken on a frame that missed its send deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LateFramePolicy {
    Drop,
    RepeatLast,
    DegradeFps,
    TimeStretchAudio,
}

impl Default for LateFramePolicy {
    fn default() -> Self {
        Self::Drop
    }
}

/// Lip-Sync Scorer thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LipSyncPolicy {
    pub max_offset_ms: f64,
    pub offset_step_ms: f64,
    pub silence_threshold: f64,
    pub lip_warn: f64,
    pub lip_fail: f64,
}

impl Default for LipSyncPolicy {
    fn default() -> Self {
        Self {
            max_offset_ms: 200.0,
            offset_step_ms: 20.0,
            silence_threshold: 1e-3,
            lip_warn: 0.55,
            lip_fail: 0.45,
        }
    }
}

/// Identity/Drift Monitor thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftThresholds {
    pub identity_warn: f64,
    pub identity_fail: f64,
    pub bg_warn: f64,
    pub bg_fail: f64,
    pub flicker_warn: f64,
    pub flicker_fail: f64,
}

impl Default for DriftThresholds {
    fn default() -> Self {
        Self {
            identity_warn: 0.84,
            identity_fail: 0.74,
            bg_warn: 0.80,
            bg_fail: 0.70,
            flicker_warn: 0.40,
            flicker_fail: 0.60,
        }
    }
}

/// Anchor Selector refresh policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnchorRefreshPolicy {
    pub refresh_every_turns: u32,
    pub drift_fail_threshold: f64,
    pub drift_warn_threshold: f64,
    pub flicker_fail_threshold: f64,
}

impl Default for AnchorRefreshPolicy {
    fn default() -> Self {
        Self {
            refresh_every_turns: 8,
            drift_fail_threshold: 0.74,
            drift_warn_threshold: 0.84,
            flicker_fail_threshold: 0.6,
        }
    }
}

/// Quality Controller thresholds and cooldown windows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityPolicy {
    pub lip_warn: f64,
    pub lip_fail: f64,
    pub lip_fail_consecutive: u32,
    pub drift_warn_identity: f64,
    pub drift_fail_identity: f64,
    pub av_offset_warn_ms: f64,
    pub av_offset_fail_ms: f64,
    pub cooldown_ms_heavy_action: f64,
    pub ok_consecutive_to_recover: u32,
}

impl Default for QualityPolicy {
    fn default() -> Self {
        Self {
            lip_warn: 0.55,
            lip_fail: 0.45,
            lip_fail_consecutive: 3,
            drift_warn_identity: 0.80,
            drift_fail_identity: 0.72,
            av_offset_warn_ms: 80.0,
            av_offset_fail_ms: 140.0,
            cooldown_ms_heavy_action: 1500.0,
            ok_consecutive_to_recover: 8,
        }
    }
}

/// Degrade-ladder step targets, indexed by `min(degrade_level, len() - 1)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DegradeLadder {
    pub fps_targets: Vec<u32>,
    pub short_side_targets: Vec<u32>,
}

impl Default for DegradeLadder {
    fn default() -> Self {
        Self {
            fps_targets: vec![30, 24, 20, 15],
            short_side_targets: vec![720, 640, 512, 384],
        }
    }
}

/// Backend capability flags consumed by the Quality Controller's action
/// selection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendCapabilities {
    pub supports_rerender_block: bool,
    pub supports_anchor_reset: bool,
    pub supports_mouth_corrector: bool,
    pub supports_viseme_conditioning: bool,
    pub supports_restart_stream: bool,
    pub supports_param_update: bool,
    pub supports_failover: bool,
    pub provides_webrtc_stream: bool,
    #[serde(default)]
    pub failover_backend_id: Option<String>,
}

/// Top-level aggregate of every policy record, loadable from TOML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub turn_budget: TurnBudget,
    pub av_sync: AvSyncPolicy,
    pub lip_sync: LipSyncPolicy,
    pub drift: DriftThresholds,
    pub anchor_refresh: AnchorRefreshPolicy,
    pub quality: QualityPolicy,
    pub degrade_ladder: DegradeLadder,
}

impl CoreConfig {
    /// Load configuration from a TOML file, falling back to defaults for
    /// any field the file omits.
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text)
            .map_err(|e| crate::CoreError::Validation(format!("invalid config TOML: {e}")))
    }

    /// Serialize configuration back to a TOML file.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::Result<()> {
        let text = toml::to_string_pretty(self).map_err(|e| {
            crate::CoreError::Validation(format!("config serialization failed: {e}"))
        })?;
        std::fs::write(path, text)?;
        Ok(())
    }
}
