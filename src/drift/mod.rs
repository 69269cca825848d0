//! Identity/Drift Monitor: cosine-similarity-based identity and
//! background scoring with flicker detection.

use crate::config::DriftThresholds;
use crate::types::{Band, DriftSignal};

/// Cosine similarity over the shared prefix of `a` and `b`. Returns 0 if
/// either is empty or has zero norm (never returns NaN).
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n == 0 {
        return 0.0;
    }
    let a = &a[..n];
    let b = &b[..n];

    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a <= 0.0 || norm_b <= 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

/// Maximum cosine similarity between `emb` and each of `refs`. 0 if `refs`
/// is empty.
pub fn max_similarity(emb: &[f64], refs: &[Vec<f64>]) -> f64 {
    refs.iter()
        .map(|r| cosine_similarity(emb, r))
        .fold(0.0, f64::max)
}

/// Mean absolute difference over the overlapping prefix of two luma
/// frames. 0 if either is empty.
pub fn flicker_score(prev_luma: &[f64], next_luma: &[f64]) -> f64 {
    let n = prev_luma.len().min(next_luma.len());
    if n == 0 {
        return 0.0;
    }
    let sum: f64 = prev_luma[..n]
        .iter()
        .zip(next_luma[..n].iter())
        .map(|(p, nx)| (p - nx).abs())
        .sum();
    sum / n as f64
}

/// Reference embeddings a frame's identity/background can be compared
/// against.
#[derive(Debug, Clone, Default)]
pub struct DriftReferences {
    pub face_embeddings: Vec<Vec<f64>>,
    pub bg_embeddings: Vec<Vec<f64>>,
}

/// Score one frame's identity/background similarity and flicker. Missing
/// inputs yield 0 on that axis.
pub fn score_frame(
    face_emb: Option<&[f64]>,
    bg_emb: Option<&[f64]>,
    prev_luma: Option<&[f64]>,
    next_luma: Option<&[f64]>,
    refs: &DriftReferences,
) -> DriftSignal {
    let identity_similarity = face_emb.map_or(0.0, |e| max_similarity(e, &refs.face_embeddings));
    let bg_similarity = bg_emb.map_or(0.0, |e| max_similarity(e, &refs.bg_embeddings));
    let flicker = match (prev_luma, next_luma) {
        (Some(p), Some(n)) => flicker_score(p, n),
        _ => 0.0,
    };
    DriftSignal {
        identity_similarity,
        bg_similarity,
        flicker_score: flicker,
        pose_jitter: None,
    }
}

/// Per-axis band classification.
#[derive(Debug, Clone, Copy)]
pub struct DriftBands {
    pub identity: Band,
    pub background: Band,
    pub flicker: Band,
}

fn classify(value: f64, warn: f64, fail: f64, higher_is_better: bool) -> Band {
    if higher_is_better {
        if value < fail {
            Band::Fail
        } else if value < warn {
            Band::Warn
        } else {
            Band::Ok
        }
    } else if value > fail {
        Band::Fail
    } else if value > warn {
        Band::Warn
    } else {
        Band::Ok
    }
}

/// Apply the three-band thresholds to a drift signal.
pub fn classify_drift(signal: &DriftSignal, thresholds: &DriftThresholds) -> DriftBands {
    DriftBands {
        identity: classify(
            signal.identity_similarity,
            thresholds.identity_warn,
            thresholds.identity_fail,
            true,
        ),
        background: classify(
            signal.bg_similarity,
            thresholds.bg_warn,
            thresholds.bg_fail,
            true,
        ),
        flicker: classify(
            signal.flicker_score,
            thresholds.flicker_warn,
            thresholds.flicker_fail,
            false,
        ),
    }
}

/// Exponential moving average of each axis: `alpha * prev + (1 - alpha) * signal`.
/// A high `alpha` weights history heavily, producing a slow/smooth trend.
pub fn update_drift_trend(prev: &DriftSignal, signal: &DriftSignal, alpha: f64) -> DriftSignal {
    let ema = |p: f64, s: f64| alpha * p + (1.0 - alpha) * s;
    DriftSignal {
        identity_similarity: ema(prev.identity_similarity, signal.identity_similarity),
        bg_similarity: ema(prev.bg_similarity, signal.bg_similarity),
        flicker_score: ema(prev.flicker_score, signal.flicker_score),
        pose_jitter: signal.pose_jitter.or(prev.pose_jitter),
    }
}

/// Recommended remediation action for a set of drift bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriftAction {
    RerenderBlock,
    ForceAnchorReset,
    StrengthenAnchor,
    None,
}

/// `recommend_action`: identity/background failure outranks flicker
/// failure, which outranks any warning.
pub fn recommend_action(bands: &DriftBands) -> DriftAction {
    if bands.identity == Band::Fail || bands.background == Band::Fail {
        DriftAction::RerenderBlock
    } else if bands.flicker == Band::Fail {
        DriftAction::ForceAnchorReset
    } else if bands.identity == Band::Warn || bands.background == Band::Warn || bands.flicker == Band::Warn
    {
        DriftAction::StrengthenAnchor
    } else {
        DriftAction::None
    }
}
