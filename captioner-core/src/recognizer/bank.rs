//! `RecognizerBank`: one incremental recognizer per supported language.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use super::stub::StubRecognizer;
use super::Recognizer;
use crate::error::{CaptionerError, Result};
use crate::lang::LanguageCode;

/// Binds a `(language, model path)` pair to a live `Recognizer`.
///
/// This is the seam at which a real acoustic-model library (Vosk-shaped or
/// otherwise) is plugged in; the bank itself knows nothing about model
/// formats. `StubRecognizerFactory` below is the in-crate default used when
/// no such binding is configured.
pub trait RecognizerFactory: Send + Sync {
    fn load(
        &self,
        lang: &LanguageCode,
        model_path: &Path,
        sample_rate: u32,
    ) -> Result<Box<dyn Recognizer>>;
}

/// Always succeeds, ignoring `model_path`. Used when a language has no
/// configured acoustic model binding, and throughout the test suite.
pub struct StubRecognizerFactory;

impl RecognizerFactory for StubRecognizerFactory {
    fn load(
        &self,
        _lang: &LanguageCode,
        _model_path: &Path,
        sample_rate: u32,
    ) -> Result<Box<dyn Recognizer>> {
        Ok(Box::new(StubRecognizer::new(sample_rate)))
    }
}

/// Owns every loaded language's `Recognizer`. Exclusive to the dispatch
/// thread once built — nothing else mutates it.
pub struct RecognizerBank {
    recognizers: HashMap<LanguageCode, Box<dyn Recognizer>>,
}

impl RecognizerBank {
    /// Load one recognizer per `(language, model_path)` entry.
    ///
    /// A single language failing to load is logged and skipped; if every
    /// language fails, construction fails (§4.2: "Model loading failure for
    /// one language is non-fatal for the others, provided at least one
    /// loads; if none load, initialization fails.").
    pub fn load(
        languages: &[(LanguageCode, PathBuf)],
        sample_rate: u32,
        factory: &dyn RecognizerFactory,
    ) -> Result<Self> {
        let mut recognizers = HashMap::new();

        for (lang, path) in languages {
            match factory.load(lang, path, sample_rate) {
                Ok(recognizer) => {
                    info!(language = %lang, path = %path.display(), "recognizer loaded");
                    recognizers.insert(lang.clone(), recognizer);
                }
                Err(e) => {
                    error!(language = %lang, path = %path.display(), error = %e, "recognizer failed to load");
                }
            }
        }

        if recognizers.is_empty() {
            return Err(CaptionerError::Config(
                "no acoustic model loaded for any configured language".to_string(),
            ));
        }

        Ok(Self { recognizers })
    }

    /// Languages that successfully loaded, in no particular order.
    pub fn loaded_languages(&self) -> Vec<LanguageCode> {
        self.recognizers.keys().cloned().collect()
    }

    pub fn contains(&self, lang: &LanguageCode) -> bool {
        self.recognizers.contains_key(lang)
    }

    /// Mutable handle to a loaded recognizer, used only by the dispatch loop.
    pub fn get_mut(&mut self, lang: &LanguageCode) -> Option<&mut Box<dyn Recognizer>> {
        self.recognizers.get_mut(lang)
    }

    /// Clear one language's accumulated state, or all of them.
    pub fn reset(&mut self, lang: Option<&LanguageCode>) {
        match lang {
            Some(l) => {
                if let Some(r) = self.recognizers.get_mut(l) {
                    r.reset();
                } else {
                    warn!(language = %l, "reset requested for unknown language");
                }
            }
            None => {
                for r in self.recognizers.values_mut() {
                    r.reset();
                }
            }
        }
    }
}
