//! Viseme Aligner: converts timed phonemes or heuristic viseme sequences
//! into a merged, normalized viseme timeline.

use crate::types::VisemeEvent;

/// ARPAbet-style phoneme to normalized viseme id mapping. Case- and
/// stress-digit-invariant: trailing stress digits (0-2) are stripped and
/// the phoneme is upper-cased before matching.
pub fn phoneme_to_viseme_id(phoneme: &str) -> &'static str {
    let p = phoneme.trim().to_uppercase();
    let p = p.trim_end_matches(['0', '1', '2']);
    match p {
        "AA" => "AA",
        "AE" => "AE",
        "AH" => "AH",
        "AO" => "AO",
        "EH" => "EH",
        "ER" | "R" => "ER",
        "IH" => "IH",
        "IY" | "Y" => "IY",
        "OW" | "OY" => "OW",
        "UH" => "UH",
        "UW" => "UW",
        "B" | "M" | "P" => "BMP",
        "F" | "V" => "FV",
        "L" => "L",
        "W" | "Q" => "WQ",
        "CH" | "JH" | "SH" | "ZH" => "CHJSH",
        "TH" | "DH" => "TH",
        "T" | "D" | "K" | "G" => "TDK",
        "S" | "Z" => "S",
        "SIL" | "SP" | "SPN" | "" => "SIL",
        _ => "SIL",
    }
}

/// Merge consecutive events that share a `viseme_id` and overlap or abut
/// (`next.start_ms <= prev.end_ms`), extending the end time and taking the
/// duration-weighted average of confidence. Idempotent:
/// `merge(merge(x)) == merge(x)`.
pub fn merge_adjacent_visemes(events: Vec<VisemeEvent>) -> Vec<VisemeEvent> {
    let mut merged: Vec<VisemeEvent> = Vec::with_capacity(events.len());
    for event in events {
        if let Some(last) = merged.last_mut()
            && last.viseme_id == event.viseme_id
            && event.start_ms <= last.end_ms
        {
            let last_duration = (last.end_ms - last.start_ms).max(0.0);
            let event_duration = (event.end_ms - event.start_ms).max(0.0);
            let total_duration = last_duration + event_duration;
            last.end_ms = last.end_ms.max(event.end_ms);
            last.confidence = if total_duration > 0.0 {
                (last.confidence * last_duration + event.confidence * event_duration)
                    / total_duration
            } else {
                (last.confidence + event.confidence) / 2.0
            };
            continue;
        }
        merged.push(event);
    }
    merged
}

/// One phoneme with its ARPAbet label and timing.
#[derive(Debug, Clone)]
pub struct TimedPhoneme {
    pub phoneme: String,
    pub start_ms: f64,
    pub end_ms: f64,
    pub confidence: Option<f64>,
}

/// Map each timed phoneme to a viseme event (default confidence 0.8 if
/// missing), then merge adjacent events.
pub fn timeline_from_timed_phonemes(phonemes: &[TimedPhoneme]) -> Vec<VisemeEvent> {
    let events = phonemes
        .iter()
        .map(|p| VisemeEvent {
            start_ms: p.start_ms,
            end_ms: p.end_ms,
            viseme_id: phoneme_to_viseme_id(&p.phoneme).to_owned(),
            confidence: p.confidence.unwrap_or(0.8),
        })
        .collect();
    merge_adjacent_visemes(events)
}

/// Evenly subdivide `total_duration_ms` among `viseme_ids`, starting at
/// `start_ms`, each event carrying `confidence` clamped into `[0, 1]`.
/// Requires a non-empty `viseme_ids` and a positive duration.
pub fn heuristic_timeline_from_visemes(
    viseme_ids: &[String],
    total_duration_ms: f64,
    start_ms: f64,
    confidence: f64,
) -> crate::Result<Vec<VisemeEvent>> {
    if viseme_ids.is_empty() {
        return Err(crate::CoreError::Validation(
            "viseme_ids must not be empty".to_owned(),
        ));
    }
    if total_duration_ms <= 0.0 {
        return Err(crate::CoreError::Validation(
            "total_duration_ms must be positive".to_owned(),
        ));
    }
    let per_event_ms = total_duration_ms / viseme_ids.len() as f64;
    let confidence = confidence.clamp(0.0, 1.0);

    let events = viseme_ids
        .iter()
        .enumerate()
        .map(|(i, id)| {
            let event_start = start_ms + per_event_ms * i as f64;
            VisemeEvent {
                start_ms: event_start,
                end_ms: event_start + per_event_ms,
                viseme_id: id.clone(),
                confidence,
            }
        })
        .collect();
    Ok(merge_adjacent_visemes(events))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapping_is_case_and_stress_invariant() {
        assert_eq!(phoneme_to_viseme_id("AA"), phoneme_to_viseme_id("aa"));
        assert_eq!(phoneme_to_viseme_id("AA"), phoneme_to_viseme_id("AA1"));
        assert_eq!(phoneme_to_viseme_id("AA"), "AA");
    }

    #[test]
    fn silence_and_unknown_map_to_sil() {
        assert_eq!(phoneme_to_viseme_id(""), "SIL");
        assert_eq!(phoneme_to_viseme_id("sp"), "SIL");
        assert_eq!(phoneme_to_viseme_id("XYZ"), "SIL");
    }

    #[test]
    fn bilabial_group_maps_to_bmp() {
        for p in ["B", "M", "P"] {
            assert_eq!(phoneme_to_viseme_id(p), "BMP");
        }
    }

    #[test]
    fn merge_adjacent_visemes_is_idempotent() {
        let events = vec![
            VisemeEvent {
                start_ms: 0.0,
                end_ms: 50.0,
                viseme_id: "AA".to_owned(),
                confidence: 0.6,
            },
            VisemeEvent {
                start_ms: 50.0,
                end_ms: 100.0,
                viseme_id: "AA".to_owned(),
                confidence: 0.8,
            },
            VisemeEvent {
                start_ms: 100.0,
                end_ms: 150.0,
                viseme_id: "BMP".to_owned(),
                confidence: 0.9,
            },
        ];
        let once = merge_adjacent_visemes(events);
        let twice = merge_adjacent_visemes(once.clone());
        assert_eq!(once.len(), twice.len());
        for (a, b) in once.iter().zip(twice.iter()) {
            assert_eq!(a.viseme_id, b.viseme_id);
            assert_eq!(a.start_ms, b.start_ms);
            assert_eq!(a.end_ms, b.end_ms);
        }
        assert_eq!(once.len(), 2);
        assert!((once[0].confidence - 0.7).abs() < 1e-9);
    }

    #[test]
    fn heuristic_timeline_rejects_empty_ids() {
        let err = heuristic_timeline_from_visemes(&[], 1000.0, 0.0, 0.3).unwrap_err();
        assert!(matches!(err, crate::CoreError::Validation(_)));
    }

    #[test]
    fn heuristic_timeline_subdivides_duration_evenly() {
        let ids = vec!["SIL".to_owned(), "AA".to_owned(), "BMP".to_owned()];
        let timeline = heuristic_timeline_from_visemes(&ids, 300.0, 0.0, 0.3).expect("timeline");
        assert_eq!(timeline.len(), 3);
        assert_eq!(timeline[0].start_ms, 0.0);
        assert_eq!(timeline.last().unwrap().end_ms, 300.0);
    }

    #[test]
    fn timed_phonemes_default_confidence_when_missing() {
        let phonemes = vec![TimedPhoneme {
            phoneme: "AA1".to_owned(),
            start_ms: 0.0,
            end_ms: 50.0,
            confidence: None,
        }];
        let timeline = timeline_from_timed_phonemes(&phonemes);
        assert_eq!(timeline[0].confidence, 0.8);
        assert_eq!(timeline[0].viseme_id, "AA");
    }
}
