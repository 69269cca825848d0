//! Quality Controller: the central state machine consuming all session
//! signals and emitting bounded, hysteresis-aware recovery actions.

use crate::config::{BackendCapabilities, DegradeLadder, QualityPolicy};
use crate::types::{Band, ControllerState};

/// Per-tick lip-sync input. `score` is `None` exactly when `is_silence`,
/// `occluded`, or confidence is too low to trust.
#[derive(Debug, Clone, Copy, Default)]
pub struct LipSyncTickSignal {
    pub score: Option<f64>,
    pub confidence: f64,
    pub is_silence: bool,
    pub occluded: bool,
}

/// All signals observed on one controller tick. Every field is optional:
/// a missing signal classifies to [`Band::Ignore`] on its axis.
#[derive(Debug, Clone, Copy, Default)]
pub struct TickSignals {
    pub lipsync: Option<LipSyncTickSignal>,
    pub drift_identity_similarity: Option<f64>,
    pub av_offset_ms: Option<f64>,
    pub render_fps: Option<f64>,
}

/// Per-axis band classification for one tick.
#[derive(Debug, Clone, Copy)]
pub struct TickBands {
    pub lip: Band,
    pub drift: Band,
    pub playback: Band,
    pub system: Band,
}

/// Turn-level context the action selector needs (remaining speech time
/// for `ShortenRemainingTurn`).
#[derive(Debug, Clone, Copy)]
pub struct TurnContext {
    pub remaining_turn_sec: f64,
}

/// A recovery action the Quality Controller has decided to emit. Actions
/// accumulate within a tick; they never replace one another.
#[derive(Debug, Clone, PartialEq)]
pub enum QualityAction {
    RestartProviderStream,
    FailoverBackend { backend_id: String },
    ReduceFps { target_fps: u32 },
    ReduceResolution { target_short_side: u32 },
    ShortenRemainingTurn { target_sec: f64 },
    ApplyMouthCorrector { window: String },
    RerenderBlock { strengthen_anchor: bool },
    ForceAnchorReset,
    FallbackOfflineClip,
}

impl QualityAction {
    /// Whether this action belongs to the heavy set subject to
    /// [`QualityPolicy::cooldown_ms_heavy_action`].
    fn is_heavy(&self) -> bool {
        matches!(
            self,
            Self::RestartProviderStream
                | Self::FailoverBackend { .. }
                | Self::FallbackOfflineClip
                | Self::ForceAnchorReset
                | Self::RerenderBlock { .. }
        )
    }
}

/// Debug trace attached to a decision, useful for tests and operator
/// tooling.
#[derive(Debug, Clone)]
pub struct DecisionDebug {
    pub bands: TickBands,
    pub can_do_heavy: bool,
    pub state_after: ControllerState,
}

/// Output of one [`decide`] call.
#[derive(Debug, Clone)]
pub struct Decision {
    pub actions: Vec<QualityAction>,
    pub debug: DecisionDebug,
}

fn lipsync_band(lip: Option<LipSyncTickSignal>, policy: &QualityPolicy) -> Band {
    let Some(lip) = lip else {
        return Band::Ignore;
    };
    if lip.is_silence || lip.occluded || lip.confidence < 0.2 {
        return Band::Ignore;
    }
    let Some(score) = lip.score else {
        return Band::Ignore;
    };
    if score >= policy.lip_warn {
        Band::Ok
    } else if score >= policy.lip_fail {
        Band::Warn
    } else {
        Band::Fail
    }
}

fn drift_band(identity_similarity: Option<f64>, policy: &QualityPolicy) -> Band {
    let Some(value) = identity_similarity else {
        return Band::Ignore;
    };
    if value >= policy.drift_warn_identity {
        Band::Ok
    } else if value >= policy.drift_fail_identity {
        Band::Warn
    } else {
        Band::Fail
    }
}

fn playback_band(av_offset_ms: Option<f64>, policy: &QualityPolicy) -> Band {
    let Some(offset) = av_offset_ms else {
        return Band::Ignore;
    };
    let abs = offset.abs();
    if abs < policy.av_offset_warn_ms {
        Band::Ok
    } else if abs < policy.av_offset_fail_ms {
        Band::Warn
    } else {
        Band::Fail
    }
}

fn system_band(render_fps: Option<f64>) -> Band {
    let Some(fps) = render_fps else {
        return Band::Ignore;
    };
    if fps >= 26.0 {
        Band::Ok
    } else if fps >= 20.0 {
        Band::Warn
    } else {
        Band::Fail
    }
}

fn classify_tick(signals: &TickSignals, policy: &QualityPolicy) -> TickBands {
    TickBands {
        lip: lipsync_band(signals.lipsync, policy),
        drift: drift_band(signals.drift_identity_similarity, policy),
        playback: playback_band(signals.av_offset_ms, policy),
        system: system_band(signals.render_fps),
    }
}

fn update_streaks(state: &mut ControllerState, bands: &TickBands, policy: &QualityPolicy) {
    match bands.lip {
        Band::Fail => {
            state.lip_fail_streak += 1;
            state.lip_ok_streak = 0;
        }
        Band::Ok => {
            state.lip_ok_streak += 1;
            state.lip_fail_streak = 0;
        }
        Band::Warn | Band::Ignore => {
            state.lip_ok_streak = 0;
        }
    }

    match bands.drift {
        Band::Fail => state.drift_fail_streak += 1,
        Band::Ok => state.drift_fail_streak = 0,
        Band::Warn | Band::Ignore => {}
    }

    let all_ok_or_ignore = [bands.lip, bands.drift, bands.playback, bands.system]
        .iter()
        .all(|b| matches!(b, Band::Ok | Band::Ignore));
    if all_ok_or_ignore {
        state.overall_ok_streak += 1;
    } else {
        state.overall_ok_streak = 0;
    }

    let _ = policy; // threshold comparisons happen in action selection, not here
}

fn select_failover_chain(
    can_do_heavy: bool,
    capabilities: &BackendCapabilities,
    ctx: &TurnContext,
) -> Vec<QualityAction> {
    if !can_do_heavy {
        return Vec::new();
    }
    if capabilities.supports_restart_stream {
        return vec![QualityAction::RestartProviderStream];
    }
    if capabilities.supports_failover
        && let Some(backend_id) = &capabilities.failover_backend_id
    {
        return vec![QualityAction::FailoverBackend {
            backend_id: backend_id.clone(),
        }];
    }
    vec![
        QualityAction::ReduceFps { target_fps: 24 },
        QualityAction::ShortenRemainingTurn {
            target_sec: ctx.remaining_turn_sec.min(6.0),
        },
    ]
}

fn select_lip_fail_chain(can_do_heavy: bool, capabilities: &BackendCapabilities) -> Option<QualityAction> {
    if capabilities.supports_mouth_corrector {
        return Some(QualityAction::ApplyMouthCorrector {
            window: "last_block".to_owned(),
        });
    }
    if capabilities.supports_rerender_block {
        return Some(QualityAction::RerenderBlock {
            strengthen_anchor: true,
        });
    }
    if !can_do_heavy {
        return None;
    }
    if capabilities.supports_restart_stream {
        return Some(QualityAction::RestartProviderStream);
    }
    if capabilities.supports_failover
        && let Some(backend_id) = &capabilities.failover_backend_id
    {
        return Some(QualityAction::FailoverBackend {
            backend_id: backend_id.clone(),
        });
    }
    None
}

fn select_drift_fail_chain(can_do_heavy: bool, capabilities: &BackendCapabilities) -> Option<QualityAction> {
    if !can_do_heavy {
        return None;
    }
    if capabilities.supports_anchor_reset {
        return Some(QualityAction::ForceAnchorReset);
    }
    if capabilities.supports_restart_stream {
        return Some(QualityAction::RestartProviderStream);
    }
    if capabilities.supports_failover
        && let Some(backend_id) = &capabilities.failover_backend_id
    {
        return Some(QualityAction::FailoverBackend {
            backend_id: backend_id.clone(),
        });
    }
    None
}

fn degrade_ladder_index(degrade_level: u8, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    (degrade_level as usize).min(len - 1)
}

/// Pure function of `(signals, prior state, now_ms)`; mutates only the
/// passed-in `state`. Deterministic.
pub fn decide(
    state: &mut ControllerState,
    signals: &TickSignals,
    policy: &QualityPolicy,
    capabilities: &BackendCapabilities,
    ladder: &DegradeLadder,
    ctx: &TurnContext,
    now_ms: f64,
) -> Decision {
    let bands = classify_tick(signals, policy);
    update_streaks(state, &bands, policy);

    let can_do_heavy = state
        .last_heavy_action_ms
        .is_none_or(|last| now_ms - last >= policy.cooldown_ms_heavy_action);

    let mut actions = Vec::new();

    if bands.playback == Band::Fail {
        actions.extend(select_failover_chain(can_do_heavy, capabilities, ctx));
    }

    if state.lip_fail_streak >= policy.lip_fail_consecutive
        && let Some(action) = select_lip_fail_chain(can_do_heavy, capabilities)
    {
        actions.push(action);
    }

    if state.drift_fail_streak >= 2
        && let Some(action) = select_drift_fail_chain(can_do_heavy, capabilities)
    {
        actions.push(action);
    }

    let any_fail = [bands.lip, bands.drift, bands.playback, bands.system]
        .iter()
        .any(|b| *b == Band::Fail);
    if any_fail || (bands.system == Band::Warn && state.degrade_level < 3) {
        state.degrade_level = (state.degrade_level + 1).min(3);
    }

    let heavy_already_emitted = actions.iter().any(QualityAction::is_heavy);
    if state.degrade_level > 0 && !heavy_already_emitted {
        let fps_idx = degrade_ladder_index(state.degrade_level, ladder.fps_targets.len());
        let res_idx = degrade_ladder_index(state.degrade_level, ladder.short_side_targets.len());
        if let Some(&target_fps) = ladder.fps_targets.get(fps_idx) {
            actions.push(QualityAction::ReduceFps { target_fps });
        }
        if let Some(&target_short_side) = ladder.short_side_targets.get(res_idx) {
            actions.push(QualityAction::ReduceResolution { target_short_side });
        }
    }

    if state.degrade_level > 0 && state.overall_ok_streak >= policy.ok_consecutive_to_recover {
        state.degrade_level -= 1;
        state.overall_ok_streak = 0;
    }

    if actions.iter().any(QualityAction::is_heavy) {
        state.last_heavy_action_ms = Some(now_ms);
    }

    Decision {
        actions,
        debug: DecisionDebug {
            bands,
            can_do_heavy,
            state_after: state.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lip_fail_signal() -> TickSignals {
        TickSignals {
            lipsync: Some(LipSyncTickSignal {
                score: Some(0.30),
                confidence: 0.9,
                is_silence: false,
                occluded: false,
            }),
            ..Default::default()
        }
    }

    #[test]
    fn lip_fail_escalation_applies_mouth_corrector_on_third_tick() {
        let mut state = ControllerState::default();
        let policy = QualityPolicy::default();
        let capabilities = BackendCapabilities {
            supports_mouth_corrector: true,
            ..Default::default()
        };
        let ladder = DegradeLadder::default();
        let ctx = TurnContext { remaining_turn_sec: 5.0 };

        let mut last = None;
        for tick in 0..3 {
            last = Some(decide(
                &mut state,
                &lip_fail_signal(),
                &policy,
                &capabilities,
                &ladder,
                &ctx,
                tick as f64 * 500.0,
            ));
        }
        let decision = last.expect("three ticks ran");
        assert!(decision.actions.contains(&QualityAction::ApplyMouthCorrector {
            window: "last_block".to_owned()
        }));
        assert_eq!(state.lip_fail_streak, 3);
    }

    #[test]
    fn heavy_action_cooldown_suppresses_second_restart() {
        let mut state = ControllerState::default();
        let policy = QualityPolicy::default();
        let capabilities = BackendCapabilities {
            supports_restart_stream: true,
            ..Default::default()
        };
        let ladder = DegradeLadder::default();
        let ctx = TurnContext { remaining_turn_sec: 5.0 };
        let playback_fail = TickSignals {
            av_offset_ms: Some(200.0),
            ..Default::default()
        };

        let first = decide(&mut state, &playback_fail, &policy, &capabilities, &ladder, &ctx, 0.0);
        assert!(first.actions.contains(&QualityAction::RestartProviderStream));

        let second = decide(&mut state, &playback_fail, &policy, &capabilities, &ladder, &ctx, 500.0);
        assert!(!second.actions.contains(&QualityAction::RestartProviderStream));
    }

    #[test]
    fn overall_ok_streak_increments_on_all_ignore() {
        let mut state = ControllerState::default();
        let policy = QualityPolicy::default();
        let capabilities = BackendCapabilities::default();
        let ladder = DegradeLadder::default();
        let ctx = TurnContext { remaining_turn_sec: 5.0 };

        let decision = decide(
            &mut state,
            &TickSignals::default(),
            &policy,
            &capabilities,
            &ladder,
            &ctx,
            0.0,
        );
        assert_eq!(decision.debug.state_after.overall_ok_streak, 1);
    }

    #[test]
    fn overall_ok_streak_resets_on_fail() {
        let mut state = ControllerState {
            overall_ok_streak: 5,
            ..Default::default()
        };
        let policy = QualityPolicy::default();
        let capabilities = BackendCapabilities::default();
        let ladder = DegradeLadder::default();
        let ctx = TurnContext { remaining_turn_sec: 5.0 };

        decide(
            &mut state,
            &lip_fail_signal(),
            &policy,
            &capabilities,
            &ladder,
            &ctx,
            0.0,
        );
        assert_eq!(state.overall_ok_streak, 0);
    }

    #[test]
    fn degrade_recovers_to_zero_after_enough_ok_ticks() {
        let mut state = ControllerState {
            degrade_level: 3,
            ..Default::default()
        };
        let policy = QualityPolicy::default();
        let capabilities = BackendCapabilities::default();
        let ladder = DegradeLadder::default();
        let ctx = TurnContext { remaining_turn_sec: 5.0 };

        for tick in 0..(policy.ok_consecutive_to_recover * 3) {
            decide(
                &mut state,
                &TickSignals::default(),
                &policy,
                &capabilities,
                &ladder,
                &ctx,
                tick as f64 * 20.0,
            );
        }
        assert_eq!(state.degrade_level, 0);
    }

    #[test]
    fn degrade_index_saturates_to_last_element() {
        let ladder = DegradeLadder {
            fps_targets: vec![30],
            short_side_targets: vec![720],
        };
        assert_eq!(degrade_ladder_index(3, ladder.fps_targets.len()), 0);
    }
}
