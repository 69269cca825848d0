//! Turn Planner: converts a user message into a bounded, prioritized
//! speech plan.

use crate::config::TurnBudget as TurnBudgetPolicy;
use crate::types::{ActorState, ActorTimelineEntry, CameraMode, TurnPlan, TurnSegment};
use crate::{CoreError, Result};

const MAX_WORDS_PER_SEGMENT: usize = 28;
const MAX_SEGMENTS: usize = 8;
const WPM_ENGLISH: f64 = 150.0;
const WPM_OTHER: f64 = 140.0;

impl TurnBudgetPolicy {
    /// Read the budget from environment variables, falling back to
    /// defaults for any variable that is unset or unparseable.
    ///
    /// Recognized variables: `FT_GEN_MAX_VIDEO_SEC`, `FT_GEN_MIN_VIDEO_SEC`,
    /// `FT_GEN_DEFAULT_VIDEO_SEC`, `FT_GEN_DEFAULT_MAX_VIDEO_SEC`.
    pub fn from_env() -> Self {
        let mut budget = Self::default();
        if let Some(v) = read_env_f64("FT_GEN_MAX_VIDEO_SEC") {
            budget.hardcap_sec = v;
        }
        if let Some(v) = read_env_f64("FT_GEN_MIN_VIDEO_SEC") {
            budget.min_target_sec = v;
        }
        if let Some(v) = read_env_f64("FT_GEN_DEFAULT_VIDEO_SEC") {
            budget.default_target_min_sec = v;
        }
        if let Some(v) = read_env_f64("FT_GEN_DEFAULT_MAX_VIDEO_SEC") {
            budget.default_target_max_sec = v;
        }
        budget.clamp_ordering();
        budget
    }

    /// Enforce `1 <= min <= max <= hardcap`.
    fn clamp_ordering(&mut self) {
        self.min_target_sec = self.min_target_sec.max(1.0);
        self.hardcap_sec = self.hardcap_sec.max(self.min_target_sec);
        self.default_target_min_sec = self
            .default_target_min_sec
            .clamp(self.min_target_sec, self.hardcap_sec);
        self.default_target_max_sec = self
            .default_target_max_sec
            .clamp(self.default_target_min_sec, self.hardcap_sec);
    }

    /// `hardcap_sec - tail_buffer_sec`, the maximum cumulative speech time
    /// the clamp algorithm will include.
    pub fn max_exec_sec(&self) -> f64 {
        (self.hardcap_sec - self.tail_buffer_sec).max(0.0)
    }
}

fn read_env_f64(name: &str) -> Option<f64> {
    std::env::var(name).ok().and_then(|s| s.parse::<f64>().ok())
}

/// Estimate spoken duration of `text` in seconds.
///
/// `words_per_minute` is 150 for English, 140 otherwise. Pause terms add
/// 0.18s per comma, 0.38s per sentence terminator, and 0.5s per run of
/// newlines. Never negative.
pub fn estimate_speech_seconds(text: &str, language: &str) -> f64 {
    let word_count = text.split_whitespace().count() as f64;
    if word_count == 0.0 {
        return 0.0;
    }
    let wpm = if language.eq_ignore_ascii_case("en") {
        WPM_ENGLISH
    } else {
        WPM_OTHER
    };

    let comma_count = text.chars().filter(|&c| c == ',').count() as f64;
    let terminator_count = count_sentence_terminators(text) as f64;
    let newline_run_count = count_newline_runs(text) as f64;

    let pause_terms = comma_count * 0.18 + terminator_count * 0.38 + newline_run_count * 0.5;
    let speech_sec = word_count / (wpm / 60.0) + pause_terms;
    speech_sec.max(0.0)
}

/// Count `.`/`!`/`?` that end a sentence, i.e. are followed by whitespace
/// or end-of-string. Skips terminators embedded in decimals ("3.5") or
/// abbreviations ("Dr.") followed directly by more letters.
fn count_sentence_terminators(text: &str) -> usize {
    let chars: Vec<char> = text.chars().collect();
    chars
        .iter()
        .enumerate()
        .filter(|&(i, &c)| {
            matches!(c, '.' | '!' | '?') && chars.get(i + 1).is_none_or(|next| next.is_whitespace())
        })
        .count()
}

fn count_newline_runs(text: &str) -> usize {
    let mut runs = 0;
    let mut in_run = false;
    for c in text.chars() {
        if c == '\n' {
            if !in_run {
                runs += 1;
                in_run = true;
            }
        } else {
            in_run = false;
        }
    }
    runs
}

/// Split `text` into sentences on `.`, `!`, `?`, dropping empty results.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') {
            let trimmed = current.trim().to_owned();
            if !trimmed.is_empty() {
                sentences.push(trimmed);
            }
            current.clear();
        }
    }
    let trimmed = current.trim().to_owned();
    if !trimmed.is_empty() {
        sentences.push(trimmed);
    }
    sentences
}

/// Greedily pack sentences into segments of at most
/// [`MAX_WORDS_PER_SEGMENT`] words, capped at [`MAX_SEGMENTS`] segments.
/// Segments are assigned ascending priority in emission order.
pub fn split_into_segments(text: &str, language: &str) -> Vec<TurnSegment> {
    let sentences = split_sentences(text);
    let mut segments = Vec::new();
    let mut buffer: Vec<&str> = Vec::new();
    let mut buffer_words = 0usize;

    let flush = |buffer: &mut Vec<&str>, segments: &mut Vec<TurnSegment>, language: &str| {
        if buffer.is_empty() {
            return;
        }
        let text = buffer.join(" ");
        let est_sec = estimate_speech_seconds(&text, language);
        segments.push(TurnSegment {
            priority: segments.len() as u32,
            text,
            est_sec,
        });
        buffer.clear();
    };

    for sentence in &sentences {
        if segments.len() >= MAX_SEGMENTS {
            break;
        }
        let words = sentence.split_whitespace().count();
        if buffer_words > 0 && buffer_words + words > MAX_WORDS_PER_SEGMENT {
            flush(&mut buffer, &mut segments, language);
            buffer_words = 0;
            if segments.len() >= MAX_SEGMENTS {
                break;
            }
        }
        buffer.push(sentence.as_str());
        buffer_words += words;
    }
    if segments.len() < MAX_SEGMENTS {
        flush(&mut buffer, &mut segments, language);
    }
    segments
}

/// Choose a target duration given an estimate and the process budget.
pub fn choose_target_seconds(estimated_sec: f64, budget: &TurnBudgetPolicy) -> f64 {
    if estimated_sec <= 0.0 {
        budget.min_target_sec
    } else if estimated_sec < budget.min_target_sec {
        estimated_sec.max(1.0)
    } else {
        estimated_sec.clamp(budget.default_target_min_sec, budget.default_target_max_sec)
    }
}

/// Build a heuristic turn plan directly from user text, without an LLM.
///
/// Returns the plan, the human-readable response text (concatenation of
/// included segments), and any warnings raised while clamping.
pub fn create_heuristic_turn_plan(
    user_text: &str,
    camera_mode_suggestion: Option<CameraMode>,
    budget: &TurnBudgetPolicy,
    language: &str,
) -> (TurnPlan, String, Vec<String>) {
    let estimated = estimate_speech_seconds(user_text, language);
    let target_sec = choose_target_seconds(estimated, budget);
    let segments = split_into_segments(user_text, language);

    let draft = TurnPlan {
        target_sec,
        hardcap_sec: budget.hardcap_sec,
        segments,
        actor_timeline: Vec::new(),
        camera_mode: camera_mode_suggestion.unwrap_or_default(),
    };
    clamp_turn_plan(draft, budget, language)
}

/// Apply the spec's clamp algorithm to any candidate plan (heuristic or
/// externally produced, i.e. untrusted): reset a malformed `target_sec`,
/// sort by priority, recompute missing/negative `est_sec`, always include
/// at least the first segment even if it alone exceeds the execution
/// budget, stop once `target_sec` or `max_exec_sec()` is reached, default
/// the actor timeline and camera mode, and collect a warning for every
/// defaulted, reset, or recomputed field.
pub fn clamp_turn_plan(
    mut plan: TurnPlan,
    budget: &TurnBudgetPolicy,
    language: &str,
) -> (TurnPlan, String, Vec<String>) {
    let mut warnings = Vec::new();

    let max_exec = budget.max_exec_sec();
    if !plan.target_sec.is_finite() || plan.target_sec <= 0.0 {
        plan.target_sec = budget.min_target_sec;
        warnings.push("target_sec was invalid; reset to budget minimum".to_owned());
    }
    plan.target_sec = plan.target_sec.max(1.0).min(max_exec);

    plan.segments.sort_by_key(|s| s.priority);

    for segment in &mut plan.segments {
        if !segment.est_sec.is_finite() || segment.est_sec < 0.0 {
            segment.est_sec = estimate_speech_seconds(&segment.text, language);
            warnings.push(format!(
                "recomputed est_sec for segment with priority {}",
                segment.priority
            ));
        }
    }

    let mut included = Vec::new();
    let mut cumulative = 0.0f64;
    for segment in plan.segments.into_iter() {
        if !included.is_empty() && cumulative + segment.est_sec > max_exec {
            break;
        }
        cumulative += segment.est_sec;
        included.push(segment);
        if cumulative >= plan.target_sec {
            break;
        }
    }

    if included.is_empty() {
        warnings.push("turn plan had no includable segments".to_owned());
    } else {
        plan.target_sec = cumulative.min(max_exec);
    }

    if plan.actor_timeline.is_empty() {
        plan.actor_timeline.push(ActorTimelineEntry {
            t0: 0.0,
            t1: plan.target_sec,
            state: ActorState::Speaking,
            emotion: "neutral".to_owned(),
            intensity: 0.5,
            gaze_mode: None,
            blink_rate: None,
        });
        warnings.push("defaulted empty actor_timeline".to_owned());
    }

    plan.hardcap_sec = budget.hardcap_sec;
    plan.segments = included;

    let response_text = plan
        .segments
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");

    (plan, response_text, warnings)
}

/// Validate a turn plan against the process budget, accumulating every
/// violation into a single list rather than failing fast.
pub fn validate_turn_plan(plan: &TurnPlan, budget: &TurnBudgetPolicy) -> Result<()> {
    let mut errors = Vec::new();

    if plan.target_sec <= 0.0 || !plan.target_sec.is_finite() {
        errors.push("target_sec must be positive and finite".to_owned());
    }
    if (plan.hardcap_sec - budget.hardcap_sec).abs() > f64::EPSILON {
        errors.push("hardcap_sec does not match the configured process hardcap".to_owned());
    }
    if plan.target_sec > plan.hardcap_sec {
        errors.push("target_sec exceeds hardcap_sec".to_owned());
    }
    if plan.segments.is_empty() {
        errors.push("segments must not be empty".to_owned());
    }
    for segment in &plan.segments {
        if segment.text.trim().is_empty() {
            errors.push(format!("segment priority {} has empty text", segment.priority));
        }
        if segment.est_sec < 0.0 || !segment.est_sec.is_finite() {
            errors.push(format!(
                "segment priority {} has invalid est_sec",
                segment.priority
            ));
        }
    }
    for entry in &plan.actor_timeline {
        if entry.t0 > entry.t1 || !entry.t0.is_finite() || !entry.t1.is_finite() {
            errors.push("actor_timeline entry has malformed interval".to_owned());
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(CoreError::Validation(errors.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_estimates_zero_seconds() {
        assert_eq!(estimate_speech_seconds("", "en"), 0.0);
    }

    #[test]
    fn speech_estimate_is_never_negative() {
        assert!(estimate_speech_seconds("hello, world!", "en") >= 0.0);
    }

    #[test]
    fn split_sentences_drops_empty_fragments() {
        let sentences = split_sentences("Hi there. How are you? Great!");
        assert_eq!(sentences, vec!["Hi there.", "How are you?", "Great!"]);
    }

    #[test]
    fn split_into_segments_respects_segment_cap() {
        let text = (0..20)
            .map(|i| format!("Sentence number {i}."))
            .collect::<Vec<_>>()
            .join(" ");
        let segments = split_into_segments(&text, "en");
        assert!(segments.len() <= MAX_SEGMENTS);
    }

    #[test]
    fn choose_target_seconds_floors_short_estimates() {
        let budget = TurnBudgetPolicy::default();
        let target = choose_target_seconds(0.2, &budget);
        assert_eq!(target, 1.0);
    }

    #[test]
    fn turn_plan_clamp_respects_hardcap_minus_tail_buffer() {
        let budget = TurnBudgetPolicy::default();
        let plan = TurnPlan {
            target_sec: budget.max_exec_sec(),
            hardcap_sec: budget.hardcap_sec,
            segments: (0..5)
                .map(|i| TurnSegment {
                    priority: i,
                    text: format!("segment {i}"),
                    est_sec: 3.0,
                })
                .collect(),
            actor_timeline: Vec::new(),
            camera_mode: CameraMode::ASelfie,
        };

        let (plan, _response, warnings) = clamp_turn_plan(plan, &budget, "en");
        let cumulative: f64 = plan.segments.iter().map(|s| s.est_sec).sum();
        assert!(cumulative <= budget.max_exec_sec() + 1e-9);
        assert_eq!(plan.camera_mode, CameraMode::ASelfie);
        assert!(warnings.iter().all(|w| !w.contains("recomputed")));
    }

    #[test]
    fn clamp_turn_plan_force_includes_oversized_first_segment() {
        let budget = TurnBudgetPolicy::default();
        let plan = TurnPlan {
            target_sec: budget.max_exec_sec(),
            hardcap_sec: budget.hardcap_sec,
            segments: vec![TurnSegment {
                priority: 0,
                text: "one very long unpunctuated segment that exceeds the execution budget"
                    .to_owned(),
                est_sec: budget.max_exec_sec() + 5.0,
            }],
            actor_timeline: Vec::new(),
            camera_mode: CameraMode::ASelfie,
        };

        let (plan, _response, warnings) = clamp_turn_plan(plan, &budget, "en");
        assert_eq!(plan.segments.len(), 1);
        assert!(warnings.iter().all(|w| w != "turn plan had no includable segments"));
    }

    #[test]
    fn clamp_turn_plan_resets_invalid_target_sec() {
        let budget = TurnBudgetPolicy::default();
        let plan = TurnPlan {
            target_sec: -3.0,
            hardcap_sec: budget.hardcap_sec,
            segments: vec![TurnSegment {
                priority: 0,
                text: "hello".to_owned(),
                est_sec: 1.0,
            }],
            actor_timeline: Vec::new(),
            camera_mode: CameraMode::ASelfie,
        };

        let (plan, _response, warnings) = clamp_turn_plan(plan, &budget, "en");
        assert!(plan.target_sec > 0.0 && plan.target_sec.is_finite());
        assert!(warnings.iter().any(|w| w.contains("invalid; reset")));
    }

    #[test]
    fn validate_turn_plan_rejects_empty_segments() {
        let budget = TurnBudgetPolicy::default();
        let plan = TurnPlan {
            target_sec: 2.0,
            hardcap_sec: budget.hardcap_sec,
            segments: Vec::new(),
            actor_timeline: Vec::new(),
            camera_mode: CameraMode::ASelfie,
        };
        assert!(validate_turn_plan(&plan, &budget).is_err());
    }

    #[test]
    fn validate_turn_plan_rejects_hardcap_mismatch() {
        let budget = TurnBudgetPolicy::default();
        let plan = TurnPlan {
            target_sec: 2.0,
            hardcap_sec: budget.hardcap_sec + 1.0,
            segments: vec![TurnSegment {
                priority: 0,
                text: "hi".to_owned(),
                est_sec: 1.0,
            }],
            actor_timeline: vec![ActorTimelineEntry {
                t0: 0.0,
                t1: 2.0,
                state: ActorState::Speaking,
                emotion: "neutral".to_owned(),
                intensity: 0.5,
                gaze_mode: None,
                blink_rate: None,
            }],
            camera_mode: CameraMode::ASelfie,
        };
        assert!(validate_turn_plan(&plan, &budget).is_err());
    }
}
