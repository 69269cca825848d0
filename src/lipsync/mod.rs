//! Lip-Sync Scorer: windowed correlation of an audio envelope against a
//! mouth-open trajectory.

use crate::config::LipSyncPolicy;
use crate::types::{LipSyncLabel, LipSyncScore};
use crate::{CoreError, Result};

/// Pearson correlation coefficient of two equal-length slices. Returns 0
/// when either has zero variance (guards against division by zero; never
/// returns NaN).
pub fn pearson_correlation(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    let n = a.len() as f64;
    if n == 0.0 {
        return 0.0;
    }
    let mean_a = a.iter().sum::<f64>() / n;
    let mean_b = b.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        let da = x - mean_a;
        let db = y - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }

    if var_a <= 0.0 || var_b <= 0.0 {
        return 0.0;
    }
    (cov / (var_a.sqrt() * var_b.sqrt())).clamp(-1.0, 1.0)
}

/// The overlapping window of `audio` and `mouth` after applying a shift of
/// `shift_steps` steps (positive advances `mouth`, negative advances
/// `audio`). Returns `None` if the resulting overlap has length <= 2
/// (including the case where `shift_steps` equals the full sequence
/// length, which yields an empty window).
pub fn aligned_overlap(audio: &[f64], mouth: &[f64], shift_steps: i64) -> Option<(Vec<f64>, Vec<f64>)> {
    let n = audio.len();
    if n == 0 || mouth.len() != n {
        return None;
    }
    let shift = shift_steps.unsigned_abs() as usize;
    if shift >= n {
        return None;
    }
    let (a_slice, m_slice) = if shift_steps >= 0 {
        (&audio[..n - shift], &mouth[shift..])
    } else {
        (&audio[shift..], &mouth[..n - shift])
    };
    if a_slice.len() <= 2 {
        return None;
    }
    Some((a_slice.to_vec(), m_slice.to_vec()))
}

fn clamp01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

/// Score one lip-sync window by searching for the best-aligning offset
/// between `audio_envelope` and `mouth_open`.
///
/// `window_id` must be non-empty and `step_ms` must be positive, else a
/// [`CoreError::Validation`] is returned. The two sequences must have
/// equal length.
pub fn score_heuristic_window(
    window_id: &str,
    audio_envelope: &[f64],
    mouth_open: &[f64],
    step_ms: f64,
    policy: &LipSyncPolicy,
) -> Result<LipSyncScore> {
    if window_id.is_empty() {
        return Err(CoreError::Validation("window_id must not be empty".to_owned()));
    }
    if step_ms <= 0.0 {
        return Err(CoreError::Validation("step_ms must be positive".to_owned()));
    }
    if audio_envelope.len() != mouth_open.len() {
        return Err(CoreError::Validation(
            "audio_envelope and mouth_open must have equal length".to_owned(),
        ));
    }

    let mean_audio = if audio_envelope.is_empty() {
        0.0
    } else {
        audio_envelope.iter().sum::<f64>() / audio_envelope.len() as f64
    };
    if mean_audio < policy.silence_threshold {
        return Ok(LipSyncScore {
            window_id: window_id.to_owned(),
            score: None,
            offset_ms: None,
            confidence: 0.0,
            label: LipSyncLabel::Silence,
        });
    }

    let max_shift_steps = (policy.max_offset_ms / step_ms).round().max(1.0) as i64;
    let shift_step = (policy.offset_step_ms / step_ms).round().max(1.0) as i64;

    let mut correlations: Vec<(i64, f64)> = Vec::new();
    let mut shift = -max_shift_steps;
    while shift <= max_shift_steps {
        if let Some((a, m)) = aligned_overlap(audio_envelope, mouth_open, shift) {
            let r = pearson_correlation(&a, &m);
            correlations.push((shift, r));
        }
        shift += shift_step;
    }

    let Some(&(best_shift, best_r)) = correlations
        .iter()
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
    else {
        return Ok(LipSyncScore {
            window_id: window_id.to_owned(),
            score: None,
            offset_ms: None,
            confidence: 0.0,
            label: LipSyncLabel::Unknown,
        });
    };
    let second_r = correlations
        .iter()
        .filter(|&&(shift, _)| shift != best_shift)
        .map(|&(_, r)| r)
        .fold(f64::NEG_INFINITY, f64::max);
    let second_r = if second_r.is_finite() { second_r } else { -1.0 };

    let score = clamp01((best_r + 1.0) / 2.0);
    let offset_ms = best_shift as f64 * step_ms;
    let confidence = clamp01((best_r - second_r) / 0.25);

    let label = if confidence < 0.15 {
        LipSyncLabel::Unknown
    } else if score >= policy.lip_warn {
        LipSyncLabel::Ok
    } else if score >= policy.lip_fail {
        LipSyncLabel::Warn
    } else {
        LipSyncLabel::Fail
    };

    Ok(LipSyncScore {
        window_id: window_id.to_owned(),
        score: Some(score),
        offset_ms: Some(offset_ms),
        confidence,
        label,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq_hz: f64, sample_rate_hz: f64, seconds: f64) -> Vec<f64> {
        let n = (sample_rate_hz * seconds) as usize;
        (0..n)
            .map(|i| (2.0 * std::f64::consts::PI * freq_hz * i as f64 / sample_rate_hz).sin())
            .collect()
    }

    #[test]
    fn silence_window_returns_null_score() {
        let audio = vec![0.0001; 50];
        let mouth: Vec<f64> = (0..50).map(|i| 0.1 * (i + 1) as f64).collect();
        let policy = LipSyncPolicy::default();
        let result = score_heuristic_window("w1", &audio, &mouth, 20.0, &policy).expect("score");
        assert!(result.score.is_none());
        assert_eq!(result.label, LipSyncLabel::Silence);
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn perfect_alignment_scores_near_one() {
        let sine_wave = sine(10.0, 50.0, 2.0);
        let policy = LipSyncPolicy::default();
        let result =
            score_heuristic_window("w2", &sine_wave, &sine_wave, 20.0, &policy).expect("score");
        assert!(result.score.unwrap() >= 0.99);
        assert_eq!(result.offset_ms, Some(0.0));
        assert_eq!(result.label, LipSyncLabel::Ok);
    }

    #[test]
    fn lagging_mouth_reports_positive_offset() {
        let audio = sine(10.0, 50.0, 2.0);
        let mut mouth = vec![0.0; audio.len()];
        let shift = 3;
        for i in shift..audio.len() {
            mouth[i] = audio[i - shift];
        }
        let policy = LipSyncPolicy::default();
        let result = score_heuristic_window("w3", &audio, &mouth, 20.0, &policy).expect("score");
        let offset = result.offset_ms.expect("offset");
        assert!((offset - 60.0).abs() <= 20.0);
    }

    #[test]
    fn score_is_bounded_in_unit_interval() {
        let a = vec![0.5, 0.1, 0.9, 0.2, 0.4, 0.8];
        let b = vec![0.2, 0.6, 0.1, 0.9, 0.3, 0.5];
        let policy = LipSyncPolicy::default();
        let result = score_heuristic_window("w4", &a, &b, 20.0, &policy).expect("score");
        if let Some(score) = result.score {
            assert!((0.0..=1.0).contains(&score));
        }
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let policy = LipSyncPolicy::default();
        let err = score_heuristic_window("w5", &[1.0, 2.0], &[1.0], 20.0, &policy).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn pearson_correlation_handles_zero_variance() {
        let constant = vec![1.0; 10];
        let varying: Vec<f64> = (0..10).map(|i| i as f64).collect();
        assert_eq!(pearson_correlation(&constant, &varying), 0.0);
    }

    #[test]
    fn aligned_overlap_is_empty_at_full_length_shift() {
        let a = vec![0.0; 5];
        let b = vec![0.0; 5];
        assert!(aligned_overlap(&a, &b, 5).is_none());
    }
}
