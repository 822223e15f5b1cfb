//! Recency-weighted, confidence-scored active-language tracking (§4.4).
//!
//! Each language accumulates a sliding window of recent Final confidences;
//! the detector reports whichever language currently scores highest,
//! weighted toward its most recent entries. `unknown <=> confidence == 0.0`
//! always holds.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::lang::LanguageCode;

/// Sliding-window size per language (§4.4: "up to `W = 10` entries").
const WINDOW_SIZE: usize = 10;

/// Minimum window entries before a language becomes eligible for detection.
const MIN_SAMPLES_FOR_DETECTION: usize = 3;

/// Organic scoring never reaches 1.0 — that value is reserved for an
/// operator `force()` override (§3 DetectionState: "`confidence == 1.0` iff
/// operator override is active").
const MAX_ORGANIC_CONFIDENCE: f32 = 0.999;

/// One Final's contribution to a language's window.
#[derive(Debug, Clone, Copy)]
struct ScoreEntry {
    avg_confidence: f32,
    word_count: usize,
}

/// Aggregated detection snapshot (§4.4's `get_detection_statistics`).
#[derive(Debug, Clone)]
pub struct DetectionStatistics {
    pub detected_language: Option<LanguageCode>,
    pub confidence: f32,
    pub language_breakdown: HashMap<LanguageCode, f32>,
    pub total_samples: usize,
}

#[derive(Debug, Default)]
struct DetectorState {
    windows: HashMap<LanguageCode, Vec<ScoreEntry>>,
    detected: Option<LanguageCode>,
    confidence: f32,
    forced: bool,
}

impl DetectorState {
    fn score(window: &[ScoreEntry]) -> f32 {
        if window.len() < MIN_SAMPLES_FOR_DETECTION {
            return 0.0;
        }
        let mut weighted_sum = 0.0f64;
        let mut weight_sum = 0.0f64;
        for (i, entry) in window.iter().enumerate() {
            let weight = (i + 1) as f64;
            weighted_sum += entry.avg_confidence as f64 * weight;
            weight_sum += weight;
        }
        if weight_sum == 0.0 {
            0.0
        } else {
            ((weighted_sum / weight_sum) as f32).min(MAX_ORGANIC_CONFIDENCE)
        }
    }

    fn recompute(&mut self) {
        if self.forced {
            return;
        }
        let mut best: Option<(LanguageCode, f32)> = None;
        for (lang, window) in &self.windows {
            let s = Self::score(window);
            if s <= 0.0 {
                continue;
            }
            if best.as_ref().map(|(_, best_s)| s > *best_s).unwrap_or(true) {
                best = Some((lang.clone(), s));
            }
        }
        match best {
            Some((lang, score)) => {
                self.detected = Some(lang);
                self.confidence = score;
            }
            None => {
                self.detected = None;
                self.confidence = 0.0;
            }
        }
    }
}

/// Thread-safe language detector. Reads come from DispatchLoop (routing) and
/// ControlPlane (status); writes come from DispatchLoop (Finals) or
/// ControlPlane (force/reset) — guarded by a single `parking_lot::Mutex`
/// (no poisoning, cheaper uncontended locks than `std::sync::Mutex`).
pub struct LanguageDetector {
    state: Mutex<DetectorState>,
    detection_threshold: f32,
    /// Languages `force()` is allowed to target — the set `RecognizerBank`
    /// actually loaded, not merely those with window entries so far (§4.4,
    /// §8 S4: a language can be forced before it has ever produced a Final).
    known_languages: Vec<LanguageCode>,
}

impl LanguageDetector {
    pub fn new(languages: &[LanguageCode], detection_threshold: f32) -> Self {
        Self {
            state: Mutex::new(DetectorState::default()),
            detection_threshold,
            known_languages: languages.to_vec(),
        }
    }

    /// Feed one Final's result into `lang`'s window. `confidences` is the
    /// per-word confidence list; entries with no words are ignored.
    pub fn record_final(&self, lang: &LanguageCode, confidences: &[f32]) {
        if confidences.is_empty() {
            return;
        }
        let avg_confidence = confidences.iter().sum::<f32>() / confidences.len() as f32;
        let entry = ScoreEntry {
            avg_confidence,
            word_count: confidences.len(),
        };

        let mut state = self.state.lock();
        let window = state.windows.entry(lang.clone()).or_default();
        window.push(entry);
        if window.len() > WINDOW_SIZE {
            window.remove(0);
        }
        state.recompute();
    }

    /// `(detected_language_or_unknown, confidence)` — always reported, even
    /// below the routing threshold (§4.4).
    pub fn state(&self) -> (Option<LanguageCode>, f32) {
        let state = self.state.lock();
        (state.detected.clone(), state.confidence)
    }

    /// `true` once `state()`'s language equals `lang` *and* its confidence
    /// clears `detection_threshold` — the routing decision DispatchLoop uses
    /// to narrow from "all loaded languages" to a single focused language.
    pub fn should_prioritize_language(&self, lang: &LanguageCode) -> bool {
        let (detected, confidence) = self.state();
        detected.as_ref() == Some(lang) && confidence >= self.detection_threshold
    }

    /// Pin the detected language, overriding scoring until `reset()`.
    /// Returns `false` (and leaves state untouched) for a language outside
    /// the known set — `force` can target any loaded language regardless of
    /// whether it has produced a Final yet (§8 S4).
    pub fn force(&self, lang: &LanguageCode) -> bool {
        if !self.known_languages.contains(lang) {
            return false;
        }
        let mut state = self.state.lock();
        state.detected = Some(lang.clone());
        state.confidence = 1.0;
        state.forced = true;
        true
    }

    /// Clear all windows and the override; returns to the initial
    /// `unknown`/`0.0` state.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        *state = DetectorState::default();
    }

    pub fn statistics(&self) -> DetectionStatistics {
        let state = self.state.lock();
        let mut language_breakdown = HashMap::new();
        let mut total_samples = 0usize;
        for (lang, window) in &state.windows {
            language_breakdown.insert(lang.clone(), DetectorState::score(window));
            total_samples += window.len();
        }
        DetectionStatistics {
            detected_language: state.detected.clone(),
            confidence: state.confidence,
            language_breakdown,
            total_samples,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn langs() -> Vec<LanguageCode> {
        vec![
            LanguageCode::new("en"),
            LanguageCode::new("es"),
            LanguageCode::new("fr"),
        ]
    }

    #[test]
    fn initial_state_is_unknown_zero() {
        let detector = LanguageDetector::new(&langs(), 0.6);
        let (detected, confidence) = detector.state();
        assert!(detected.is_none());
        assert_eq!(confidence, 0.0);
    }

    #[test]
    fn detects_language_after_enough_samples() {
        let detector = LanguageDetector::new(&langs(), 0.6);
        let en = LanguageCode::new("en");
        detector.record_final(&en, &[0.9, 0.8, 0.9, 0.7, 0.8]);
        detector.record_final(&en, &[0.8, 0.9, 0.8, 0.7]);
        detector.record_final(&en, &[0.8, 0.7, 0.9, 0.8, 0.7]);

        let (detected, confidence) = detector.state();
        assert_eq!(detected, Some(en.clone()));
        assert!(confidence > 0.0);

        assert!(detector.should_prioritize_language(&en));
        assert!(!detector.should_prioritize_language(&LanguageCode::new("es")));
    }

    #[test]
    fn organic_perfect_confidence_stays_below_one_and_unforced() {
        let detector = LanguageDetector::new(&langs(), 0.6);
        let en = LanguageCode::new("en");
        for _ in 0..5 {
            detector.record_final(&en, &[1.0, 1.0, 1.0]);
        }
        let (detected, confidence) = detector.state();
        assert_eq!(detected, Some(en));
        assert!(confidence < 1.0, "organic confidence must never reach 1.0, got {confidence}");
    }

    #[test]
    fn fewer_than_min_samples_scores_zero() {
        let detector = LanguageDetector::new(&langs(), 0.6);
        let en = LanguageCode::new("en");
        detector.record_final(&en, &[0.9, 0.9]);
        let (detected, confidence) = detector.state();
        assert!(detected.is_none());
        assert_eq!(confidence, 0.0);
    }

    #[test]
    fn force_sets_confidence_to_one_and_resists_scoring() {
        let detector = LanguageDetector::new(&langs(), 0.6);
        let en = LanguageCode::new("en");
        let es = LanguageCode::new("es");
        detector.record_final(&en, &[0.9, 0.9, 0.9]);

        // es has no window entries yet but is a known (loaded) language —
        // force must still succeed (§8 S4).
        assert!(detector.force(&es));
        assert!(detector.force(&en));

        let (detected, confidence) = detector.state();
        assert_eq!(detected, Some(en.clone()));
        assert_eq!(confidence, 1.0);

        // Further finals for another language must not displace the override.
        let fr = LanguageCode::new("fr");
        detector.record_final(&fr, &[0.95, 0.95, 0.95, 0.95]);
        let (detected, confidence) = detector.state();
        assert_eq!(detected, Some(en));
        assert_eq!(confidence, 1.0);
    }

    #[test]
    fn force_rejects_unknown_language() {
        let detector = LanguageDetector::new(&langs(), 0.6);
        assert!(!detector.force(&LanguageCode::new("de")));
    }

    #[test]
    fn force_before_any_final_succeeds_for_known_language() {
        let detector = LanguageDetector::new(&langs(), 0.6);
        let es = LanguageCode::new("es");
        assert!(detector.force(&es));
        let (detected, confidence) = detector.state();
        assert_eq!(detected, Some(es));
        assert_eq!(confidence, 1.0);
    }

    #[test]
    fn reset_clears_to_initial_state() {
        let detector = LanguageDetector::new(&langs(), 0.6);
        let en = LanguageCode::new("en");
        detector.record_final(&en, &[0.9, 0.9, 0.9]);
        detector.force(&en);
        detector.reset();
        let (detected, confidence) = detector.state();
        assert!(detected.is_none());
        assert_eq!(confidence, 0.0);
    }

    #[test]
    fn statistics_report_total_samples_and_breakdown() {
        let detector = LanguageDetector::new(&langs(), 0.6);
        let en = LanguageCode::new("en");
        detector.record_final(&en, &[0.9, 0.9, 0.9]);
        let stats = detector.statistics();
        assert_eq!(stats.total_samples, 1);
        assert!(stats.language_breakdown.contains_key(&en));
    }
}
