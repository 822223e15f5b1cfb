//! A deterministic placeholder `Recognizer`.
//!
//! Used when no acoustic-model binding is configured for a language (so the
//! rest of the pipeline still has something to drive), and in tests that
//! want to control exactly when a language finalizes without depending on
//! the scripted-fake machinery in `dispatch`'s own test module.

use super::{FinalResult, PartialResult, Recognizer, WordScore};
use crate::audio::AudioFrame;
use crate::error::Result;

/// Finalizes after this many accumulated samples (~2s at 16 kHz).
const FINALIZE_AFTER_SAMPLES: usize = 32_000;

#[derive(Debug)]
pub struct StubRecognizer {
    sample_rate: u32,
    accumulated: usize,
}

impl StubRecognizer {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            accumulated: 0,
        }
    }
}

impl Recognizer for StubRecognizer {
    fn accept(&mut self, frame: &AudioFrame) -> Result<Option<FinalResult>> {
        self.accumulated += frame.samples.len();

        if self.accumulated >= FINALIZE_AFTER_SAMPLES {
            let text = format!(
                "[stub: {} samples @ {} Hz]",
                self.accumulated, self.sample_rate
            );
            let words = text
                .split_whitespace()
                .map(|w| WordScore::new(w, 1.0))
                .collect();
            self.accumulated = 0;
            return Ok(Some(FinalResult { text, words }));
        }

        Ok(None)
    }

    fn partial(&self) -> PartialResult {
        if self.accumulated == 0 {
            return PartialResult::default();
        }
        PartialResult {
            text: "...".to_string(),
            words: Vec::new(),
        }
    }

    fn reset(&mut self) {
        self.accumulated = 0;
    }
}
