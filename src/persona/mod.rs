//! Anchor Selector and persona pack registry.

use crate::config::AnchorRefreshPolicy;
use crate::types::{Anchor, CameraMode, DriftSignal, PersonaPack};
use std::collections::HashMap;

/// `pack.anchor_sets[mode]` if present and non-empty, else the first
/// non-empty set, else an empty slice.
pub fn get_anchor_set<'a>(pack: &'a PersonaPack, mode: CameraMode) -> &'a [Anchor] {
    let key = camera_mode_key(mode);
    if let Some(set) = pack.anchor_sets.get(key)
        && !set.is_empty()
    {
        return set;
    }
    pack.anchor_sets
        .values()
        .find(|set| !set.is_empty())
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn camera_mode_key(mode: CameraMode) -> &'static str {
    match mode {
        CameraMode::ASelfie => "A_SELFIE",
        CameraMode::BMirror => "B_MIRROR",
        CameraMode::CCutaway => "C_CUTAWAY",
    }
}

/// Prefer an anchor tagged "canonical", then "default", then the first.
pub fn select_canonical_anchor(anchors: &[Anchor]) -> Option<&Anchor> {
    if anchors.is_empty() {
        return None;
    }
    anchors
        .iter()
        .find(|a| has_best_for_tag(a, "canonical"))
        .or_else(|| anchors.iter().find(|a| has_best_for_tag(a, "default")))
        .or_else(|| anchors.first())
}

fn has_best_for_tag(anchor: &Anchor, tag: &str) -> bool {
    anchor
        .metadata
        .best_for
        .iter()
        .any(|t| t.eq_ignore_ascii_case(tag))
}

fn is_canonical(anchor: &Anchor) -> bool {
    has_best_for_tag(anchor, "canonical")
}

/// Score `anchor` against a desired emotion: +2.0 exact expression-tag
/// match, +1.0 tag appears in `best_for`, +0.25 if canonical.
pub fn score_anchor(anchor: &Anchor, desired_emotion: &str) -> f64 {
    let mut score = 0.0;
    if let Some(tag) = &anchor.metadata.expression_tag
        && tag.eq_ignore_ascii_case(desired_emotion)
    {
        score += 2.0;
    }
    if has_best_for_tag(anchor, desired_emotion) {
        score += 1.0;
    }
    if is_canonical(anchor) {
        score += 0.25;
    }
    score
}

/// Reason an anchor refresh was (or was not) triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshReason {
    IdentityFail,
    BackgroundFail,
    FlickerFail,
    PeriodicRefresh,
}

/// Input to [`should_refresh_anchor`].
#[derive(Debug, Clone, Copy)]
pub struct RefreshContext {
    pub turn_index: u32,
}

/// Drift-triggered checks run before the periodic check, so a turn where
/// both would fire reports the drift reason (see `SPEC_FULL.md` §9).
pub fn should_refresh_anchor(
    drift: Option<&DriftSignal>,
    ctx: &RefreshContext,
    policy: &AnchorRefreshPolicy,
) -> Option<RefreshReason> {
    if let Some(drift) = drift {
        if drift.identity_similarity < policy.drift_fail_threshold {
            return Some(RefreshReason::IdentityFail);
        }
        if drift.bg_similarity < policy.drift_fail_threshold {
            return Some(RefreshReason::BackgroundFail);
        }
        if drift.flicker_score > policy.flicker_fail_threshold {
            return Some(RefreshReason::FlickerFail);
        }
    }
    if policy.refresh_every_turns > 0
        && ctx.turn_index > 0
        && ctx.turn_index % policy.refresh_every_turns == 0
    {
        return Some(RefreshReason::PeriodicRefresh);
    }
    None
}

/// Outcome of anchor selection.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectedAnchor {
    None {
        reason: &'static str,
    },
    Reused {
        image_ref: String,
    },
    Refreshed {
        image_ref: String,
        reason: RefreshReason,
    },
    Scored {
        image_ref: String,
    },
}

/// Select an anchor for the current turn.
#[allow(clippy::too_many_arguments)]
pub fn select_anchor(
    anchors: &[Anchor],
    last_anchor_ref: Option<&str>,
    desired_emotion: &str,
    drift: Option<&DriftSignal>,
    ctx: &RefreshContext,
    policy: &AnchorRefreshPolicy,
) -> SelectedAnchor {
    if anchors.is_empty() {
        return SelectedAnchor::None { reason: "no_anchors" };
    }

    let refresh = should_refresh_anchor(drift, ctx, policy);

    if refresh.is_none()
        && let Some(last) = last_anchor_ref
        && anchors.iter().any(|a| a.image_ref == last)
    {
        return SelectedAnchor::Reused {
            image_ref: last.to_owned(),
        };
    }

    if let Some(reason) = refresh {
        let canonical = select_canonical_anchor(anchors).expect("anchors is non-empty");
        return SelectedAnchor::Refreshed {
            image_ref: canonical.image_ref.clone(),
            reason,
        };
    }

    let best = anchors
        .iter()
        .max_by(|a, b| {
            let sa = score_anchor(a, desired_emotion);
            let sb = score_anchor(b, desired_emotion);
            sa.partial_cmp(&sb)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.image_ref.cmp(&a.image_ref))
        })
        .expect("anchors is non-empty");

    SelectedAnchor::Scored {
        image_ref: best.image_ref.clone(),
    }
}

/// Validate a persona pack's invariants: non-empty `persona_id`/`version`,
/// and every declared anchor set non-empty.
pub fn validate_persona_pack(pack: &PersonaPack) -> crate::Result<()> {
    let mut errors = Vec::new();
    if pack.persona_id.trim().is_empty() {
        errors.push("persona_id must not be empty".to_owned());
    }
    if pack.version.trim().is_empty() {
        errors.push("version must not be empty".to_owned());
    }
    for (mode, anchors) in &pack.anchor_sets {
        if anchors.is_empty() {
            errors.push(format!("anchor set '{mode}' must not be empty"));
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(crate::CoreError::Validation(errors.join("; ")))
    }
}

/// Clamp every actor-timeline entry's intensity into the behavior policy's
/// declared range for its emotion, leaving entries for unknown emotions
/// untouched.
pub fn clamp_actor_timeline(
    timeline: &mut [crate::types::ActorTimelineEntry],
    pack: &PersonaPack,
) {
    for entry in timeline.iter_mut() {
        if let Some(range) = pack.behavior_policy.emotion_ranges.get(&entry.emotion) {
            entry.intensity = entry.intensity.clamp(range.min, range.max);
        }
    }
}

/// In-memory registry of persona packs, keyed by `persona_id`, holding
/// every registered version.
#[derive(Debug, Clone, Default)]
pub struct PersonaRegistry {
    packs: HashMap<String, Vec<PersonaPack>>,
}

impl PersonaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a persona pack. Multiple versions of the same
    /// `persona_id` may be registered; `version` must be unique per
    /// `persona_id`.
    pub fn register(&mut self, pack: PersonaPack) -> crate::Result<()> {
        validate_persona_pack(&pack)?;
        let versions = self.packs.entry(pack.persona_id.clone()).or_default();
        if versions.iter().any(|p| p.version == pack.version) {
            return Err(crate::CoreError::Validation(format!(
                "version '{}' already registered for persona '{}'",
                pack.version, pack.persona_id
            )));
        }
        versions.push(pack);
        Ok(())
    }

    /// The most recently registered version for `persona_id`.
    pub fn latest(&self, persona_id: &str) -> Option<&PersonaPack> {
        self.packs.get(persona_id).and_then(|v| v.last())
    }

    /// A specific version for `persona_id`.
    pub fn get_version(&self, persona_id: &str, version: &str) -> Option<&PersonaPack> {
        self.packs
            .get(persona_id)
            .and_then(|v| v.iter().find(|p| p.version == version))
    }
}
