//! Caption filtering, history, and display-statistics (§4.5).
//!
//! Generalizes a fixed `{en, es, fr}` dict-keyed design to whatever
//! languages `RecognizerBank` actually loaded.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use tracing::warn;

use crate::lang::LanguageCode;
use crate::recognizer::WordScore;

/// Default word-confidence floor below which a final word is dropped.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;

/// Default number of retained entries per language's history (§6: `ui.history_limit`).
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// Text colors keyed to a confidence band, reused by the display shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextColor {
    Green,
    Yellow,
    Red,
    /// `< 0.5` — never appears in finals after filtering, reachable only
    /// from preview text or raw confidence lookups.
    Neutral,
}

/// Map a single word-confidence value to its display color (§4.5, exact
/// boundaries carried verbatim from `get_text_color_for_confidence`).
pub fn color_for_confidence(confidence: f32) -> TextColor {
    if confidence >= 0.85 {
        TextColor::Green
    } else if confidence >= 0.65 {
        TextColor::Yellow
    } else if confidence >= 0.5 {
        TextColor::Red
    } else {
        TextColor::Neutral
    }
}

/// One caption entry, final or preview.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CaptionEntry {
    pub language: LanguageCode,
    pub text: String,
    pub words: Vec<WordScore>,
    pub is_final: bool,
}

/// Aggregate confidence statistics for one language's history
/// (§4.5: `stats(lang)`).
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct CaptionStats {
    pub total: usize,
    pub avg_confidence: f32,
    pub count_high: usize,
    pub count_medium: usize,
    pub count_low: usize,
    pub total_words: usize,
}

struct CaptionState {
    history: HashMap<LanguageCode, VecDeque<CaptionEntry>>,
    preview: HashMap<LanguageCode, Option<CaptionEntry>>,
    confidence_threshold: f32,
    history_limit: usize,
}

impl CaptionState {
    fn new(confidence_threshold: f32, history_limit: usize) -> Self {
        Self {
            history: HashMap::new(),
            preview: HashMap::new(),
            confidence_threshold,
            history_limit,
        }
    }
}

/// Pads or truncates `words` to exactly `expected_word_count` entries,
/// padding missing confidences with `1.0` (§4.5's alignment rule, carried
/// verbatim from `_filter_low_confidence_words`'s mismatch handling).
fn align_words(mut words: Vec<WordScore>, text: &str) -> Vec<WordScore> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if words.len() == tokens.len() {
        return words;
    }
    warn!(
        words = words.len(),
        tokens = tokens.len(),
        "word/confidence count mismatch, aligning"
    );
    if words.len() < tokens.len() {
        for token in &tokens[words.len()..] {
            words.push(WordScore::new(*token, 1.0));
        }
    } else {
        words.truncate(tokens.len());
    }
    for (word, token) in words.iter_mut().zip(tokens.iter()) {
        word.text = token.to_string();
    }
    words
}

/// Owns every language's caption history and current preview. Exactly one
/// lock guards both maps so a reader always sees a consistent pair
/// (§4.5: "One mutex protects both maps.").
pub struct CaptionProcessor {
    state: Mutex<CaptionState>,
}

impl CaptionProcessor {
    pub fn new(confidence_threshold: f32, history_limit: usize) -> Self {
        Self {
            state: Mutex::new(CaptionState::new(confidence_threshold, history_limit)),
        }
    }

    /// Submit a preview (non-final) recognition result: no filtering,
    /// replaces any prior preview for this language.
    pub fn submit_preview(&self, lang: &LanguageCode, text: String, words: Vec<WordScore>) {
        let entry = CaptionEntry {
            language: lang.clone(),
            text,
            words,
            is_final: false,
        };
        let mut state = self.state.lock();
        state.preview.insert(lang.clone(), Some(entry));
    }

    /// Submit a final recognition result: filter low-confidence words, and
    /// if any text survives, push it to history and clear the preview.
    pub fn submit_final(&self, lang: &LanguageCode, text: String, words: Vec<WordScore>) {
        let mut state = self.state.lock();
        let threshold = state.confidence_threshold;
        let aligned = align_words(words, &text);

        let filtered: Vec<WordScore> = aligned
            .into_iter()
            .filter(|w| w.confidence >= threshold)
            .collect();
        let filtered_text = filtered
            .iter()
            .map(|w| w.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        if !filtered_text.trim().is_empty() {
            let entry = CaptionEntry {
                language: lang.clone(),
                text: filtered_text,
                words: filtered,
                is_final: true,
            };
            let history_limit = state.history_limit;
            let history = state.history.entry(lang.clone()).or_default();
            history.push_back(entry);
            while history.len() > history_limit {
                history.pop_front();
            }
        }

        state.preview.insert(lang.clone(), None);
    }

    /// Atomic `(history, current_preview)` read for one language.
    pub fn snapshot(&self, lang: &LanguageCode) -> (Vec<CaptionEntry>, Option<CaptionEntry>) {
        let state = self.state.lock();
        let history = state
            .history
            .get(lang)
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default();
        let preview = state.preview.get(lang).cloned().flatten();
        (history, preview)
    }

    /// Clear one language's history and preview, or every language's.
    pub fn clear(&self, lang: Option<&LanguageCode>) {
        let mut state = self.state.lock();
        match lang {
            Some(l) => {
                state.history.remove(l);
                state.preview.insert(l.clone(), None);
            }
            None => {
                state.history.clear();
                state.preview.clear();
            }
        }
    }

    pub fn stats(&self, lang: &LanguageCode) -> CaptionStats {
        let state = self.state.lock();
        let Some(history) = state.history.get(lang) else {
            return CaptionStats::default();
        };

        let confidences: Vec<f32> = history
            .iter()
            .flat_map(|entry| entry.words.iter().map(|w| w.confidence))
            .collect();

        if confidences.is_empty() {
            return CaptionStats {
                total: history.len(),
                ..Default::default()
            };
        }

        let total_words = confidences.len();
        let avg_confidence = confidences.iter().sum::<f32>() / total_words as f32;
        let count_high = confidences.iter().filter(|&&c| c >= 0.85).count();
        let count_medium = confidences
            .iter()
            .filter(|&&c| (0.65..0.85).contains(&c))
            .count();
        let count_low = confidences.iter().filter(|&&c| c < 0.65).count();

        CaptionStats {
            total: history.len(),
            avg_confidence,
            count_high,
            count_medium,
            count_low,
            total_words,
        }
    }

    /// Validate and apply a new confidence threshold (§4.5: "live-mutable
    /// via ControlPlane"; `update_confidence_threshold`'s `0.0..=1.0`
    /// validation carried verbatim).
    pub fn set_confidence_threshold(&self, new_threshold: f32) -> Result<(), String> {
        if !(0.0..=1.0).contains(&new_threshold) {
            return Err(format!("invalid confidence threshold: {new_threshold}"));
        }
        self.state.lock().confidence_threshold = new_threshold;
        Ok(())
    }

    /// Plain-text export of one language's history — `[HH:MM:SS] text` is
    /// dropped in favor of just the text, since this crate does not model
    /// wall-clock timestamps per entry (§6: no filesystem I/O here, the
    /// caller decides what to do with the returned string).
    pub fn export_text(&self, lang: &LanguageCode) -> String {
        let (history, _) = self.snapshot(lang);
        history
            .iter()
            .map(|e| e.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// JSON export of one language's history.
    pub fn export_json(&self, lang: &LanguageCode) -> serde_json::Result<String> {
        let (history, _) = self.snapshot(lang);
        serde_json::to_string_pretty(&history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(pairs: &[(&str, f32)]) -> Vec<WordScore> {
        pairs
            .iter()
            .map(|(t, c)| WordScore::new(*t, *c))
            .collect()
    }

    #[test]
    fn preview_replaces_prior_preview_without_filtering() {
        let cp = CaptionProcessor::new(0.5, 10);
        let en = LanguageCode::new("en");
        cp.submit_preview(&en, "hel".to_string(), words(&[("hel", 0.1)]));
        cp.submit_preview(&en, "hello".to_string(), words(&[("hello", 0.1)]));
        let (_, preview) = cp.snapshot(&en);
        assert_eq!(preview.unwrap().text, "hello");
    }

    #[test]
    fn final_filters_low_confidence_words() {
        let cp = CaptionProcessor::new(0.5, 10);
        let en = LanguageCode::new("en");
        cp.submit_final(
            &en,
            "hello there friend".to_string(),
            words(&[("hello", 0.9), ("there", 0.2), ("friend", 0.7)]),
        );
        let (history, preview) = cp.snapshot(&en);
        assert!(preview.is_none());
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].text, "hello friend");
    }

    #[test]
    fn final_with_all_low_confidence_is_not_added() {
        let cp = CaptionProcessor::new(0.5, 10);
        let en = LanguageCode::new("en");
        cp.submit_final(&en, "um uh".to_string(), words(&[("um", 0.1), ("uh", 0.1)]));
        let (history, _) = cp.snapshot(&en);
        assert!(history.is_empty());
    }

    #[test]
    fn history_is_bounded_by_limit() {
        let cp = CaptionProcessor::new(0.0, 2);
        let en = LanguageCode::new("en");
        for i in 0..5 {
            cp.submit_final(&en, format!("word{i}"), words(&[("word", 1.0)]));
        }
        let (history, _) = cp.snapshot(&en);
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn mismatched_word_and_confidence_counts_are_aligned() {
        let cp = CaptionProcessor::new(0.0, 10);
        let en = LanguageCode::new("en");
        // Two words, one confidence -> padded with 1.0 for the second.
        cp.submit_final(&en, "hello there".to_string(), words(&[("hello", 0.9)]));
        let (history, _) = cp.snapshot(&en);
        assert_eq!(history[0].text, "hello there");
    }

    #[test]
    fn color_boundaries_match_spec() {
        assert_eq!(color_for_confidence(0.9), TextColor::Green);
        assert_eq!(color_for_confidence(0.85), TextColor::Green);
        assert_eq!(color_for_confidence(0.7), TextColor::Yellow);
        assert_eq!(color_for_confidence(0.55), TextColor::Red);
        assert_eq!(color_for_confidence(0.3), TextColor::Neutral);
    }

    #[test]
    fn threshold_validation_rejects_out_of_range() {
        let cp = CaptionProcessor::new(0.5, 10);
        assert!(cp.set_confidence_threshold(1.5).is_err());
        assert!(cp.set_confidence_threshold(-0.1).is_err());
        assert!(cp.set_confidence_threshold(0.8).is_ok());
    }

    #[test]
    fn stats_bucket_confidences_into_bands() {
        let cp = CaptionProcessor::new(0.0, 10);
        let en = LanguageCode::new("en");
        cp.submit_final(
            &en,
            "a b c".to_string(),
            words(&[("a", 0.9), ("b", 0.7), ("c", 0.3)]),
        );
        let stats = cp.stats(&en);
        assert_eq!(stats.total, 1);
        assert_eq!(stats.count_high, 1);
        assert_eq!(stats.count_medium, 1);
        assert_eq!(stats.count_low, 1);
    }

    #[test]
    fn export_text_joins_history_with_newlines() {
        let cp = CaptionProcessor::new(0.0, 10);
        let en = LanguageCode::new("en");
        cp.submit_final(&en, "hello there".to_string(), words(&[("hello", 1.0), ("there", 1.0)]));
        cp.submit_final(&en, "goodbye now".to_string(), words(&[("goodbye", 1.0), ("now", 1.0)]));
        assert_eq!(cp.export_text(&en), "hello there\ngoodbye now");
    }

    #[test]
    fn export_text_on_empty_history_is_empty_string() {
        let cp = CaptionProcessor::new(0.0, 10);
        let en = LanguageCode::new("en");
        assert_eq!(cp.export_text(&en), "");
    }

    #[test]
    fn export_json_round_trips_history_entries() {
        let cp = CaptionProcessor::new(0.0, 10);
        let en = LanguageCode::new("en");
        cp.submit_final(&en, "hello there".to_string(), words(&[("hello", 0.9), ("there", 0.8)]));
        let exported = cp.export_json(&en).unwrap();
        let entries: Vec<CaptionEntry> = serde_json::from_str(&exported).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].text, "hello there");
        assert!(entries[0].is_final);
    }

    #[test]
    fn clear_one_language_leaves_others_intact() {
        let cp = CaptionProcessor::new(0.0, 10);
        let en = LanguageCode::new("en");
        let es = LanguageCode::new("es");
        cp.submit_final(&en, "hi".to_string(), words(&[("hi", 1.0)]));
        cp.submit_final(&es, "hola".to_string(), words(&[("hola", 1.0)]));
        cp.clear(Some(&en));
        assert!(cp.snapshot(&en).0.is_empty());
        assert!(!cp.snapshot(&es).0.is_empty());
    }
}
