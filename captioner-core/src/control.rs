//! Synchronous command surface over the running engine (§4.6).
//!
//! All commands are serialized on one mutex covering this plane's view of
//! subsystem state (the active-language set and current device); the
//! subsystems themselves (`CaptionProcessor`, `LanguageDetector`) carry
//! their own internal locks and are called through, never bypassed.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use crate::audio::AudioSource;
use crate::caption::{CaptionProcessor, CaptionStats};
use crate::detector::LanguageDetector;
use crate::error::{CaptionerError, CommandErrorKind};
use crate::lang::LanguageCode;

/// `status()`'s return shape (§4.6).
#[derive(Debug, Clone)]
pub struct EngineStatus {
    pub running: bool,
    pub current_device: Option<usize>,
    pub loaded_languages: Vec<LanguageCode>,
    pub active_languages: Vec<LanguageCode>,
    pub detected_language: Option<LanguageCode>,
    pub detection_confidence: f32,
    pub per_language_stats: Vec<(LanguageCode, CaptionStats)>,
}

struct ControlState {
    current_device: Option<usize>,
    active_languages: HashSet<LanguageCode>,
}

/// The shared mutable state ControlPlane coordinates over (device + active
/// set); everything else it touches already guards itself internally.
///
/// `loaded_languages` is a fixed snapshot taken at construction time, not a
/// shared handle to the `RecognizerBank` itself — the bank is owned
/// exclusively by the dispatch thread once built (§5: "Recognizers:
/// exclusive to Dispatch thread"), and no ControlPlane operation adds or
/// removes a loaded language, so this list never goes stale for the life of
/// the engine.
pub struct ControlPlane {
    state: Mutex<ControlState>,
    audio: Arc<Mutex<AudioSource>>,
    loaded_languages: Vec<LanguageCode>,
    detector: Arc<LanguageDetector>,
    caption: Arc<CaptionProcessor>,
    active_languages_shared: Arc<Mutex<HashSet<LanguageCode>>>,
    running: Arc<AtomicBool>,
}

impl ControlPlane {
    pub fn new(
        audio: Arc<Mutex<AudioSource>>,
        loaded_languages: Vec<LanguageCode>,
        detector: Arc<LanguageDetector>,
        caption: Arc<CaptionProcessor>,
        active_languages_shared: Arc<Mutex<HashSet<LanguageCode>>>,
        running: Arc<AtomicBool>,
    ) -> Self {
        let initial_active: HashSet<LanguageCode> = loaded_languages.iter().cloned().collect();
        *active_languages_shared.lock() = initial_active.clone();

        Self {
            state: Mutex::new(ControlState {
                current_device: None,
                active_languages: initial_active,
            }),
            audio,
            loaded_languages,
            detector,
            caption,
            active_languages_shared,
            running,
        }
    }

    /// Restrict dispatch routing to the intersection of `requested` with
    /// loaded languages. Empty intersection is rejected and leaves the
    /// previous set unchanged (§4.6, see DESIGN.md for the open-question
    /// resolution).
    pub fn set_active_languages(&self, requested: &[LanguageCode]) -> crate::error::Result<()> {
        let filtered: HashSet<LanguageCode> = requested
            .iter()
            .filter(|l| self.loaded_languages.contains(l))
            .cloned()
            .collect();

        if filtered.is_empty() {
            return Err(CaptionerError::Command(CommandErrorKind::UnknownLanguage));
        }

        let mut state = self.state.lock();
        state.active_languages = filtered.clone();
        *self.active_languages_shared.lock() = filtered;
        info!(count = state.active_languages.len(), "active languages updated");
        Ok(())
    }

    /// Pin the detected language. Rejects an unloaded language.
    pub fn force_language(&self, lang: &LanguageCode) -> crate::error::Result<()> {
        if !self.detector.force(lang) {
            return Err(CaptionerError::Command(CommandErrorKind::UnknownLanguage));
        }
        Ok(())
    }

    pub fn reset_language_detection(&self) -> crate::error::Result<()> {
        self.detector.reset();
        Ok(())
    }

    /// Stop the current stream (if any), select `device_index`, and
    /// restart capture on it. Failure leaves the engine in the *stopped*
    /// state, never a half-open stream (§4.1).
    pub async fn select_device(&self, device_index: usize) -> crate::error::Result<()> {
        let was_running = self.running.load(Ordering::Relaxed);
        {
            let mut audio = self.audio.lock();
            audio.stop();
            audio.select(device_index)?;
        }
        self.state.lock().current_device = Some(device_index);
        if was_running {
            self.audio.lock().start().await?;
        }
        Ok(())
    }

    pub fn clear_history(&self, lang: Option<&LanguageCode>) -> crate::error::Result<()> {
        self.caption.clear(lang);
        Ok(())
    }

    pub fn set_confidence_threshold(&self, threshold: f32) -> crate::error::Result<()> {
        self.caption
            .set_confidence_threshold(threshold)
            .map_err(|_| CaptionerError::Command(CommandErrorKind::InvalidThreshold))
    }

    pub fn status(&self) -> EngineStatus {
        let state = self.state.lock();
        let active_languages: Vec<LanguageCode> = state.active_languages.iter().cloned().collect();
        let (detected_language, detection_confidence) = self.detector.state();
        let per_language_stats = self
            .loaded_languages
            .iter()
            .map(|lang| (lang.clone(), self.caption.stats(lang)))
            .collect();

        EngineStatus {
            running: self.running.load(Ordering::Relaxed),
            current_device: state.current_device,
            loaded_languages: self.loaded_languages.clone(),
            active_languages,
            detected_language,
            detection_confidence,
            per_language_stats,
        }
    }

    /// Idempotent: signals the dispatch loop and audio capture to stop.
    pub fn shutdown(&self) -> crate::error::Result<()> {
        self.running.store(false, Ordering::Release);
        self.audio.lock().stop();
        info!("shutdown requested");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_control_plane() -> ControlPlane {
        let en = LanguageCode::new("en");
        let es = LanguageCode::new("es");
        let loaded = vec![en.clone(), es.clone()];

        ControlPlane::new(
            Arc::new(Mutex::new(AudioSource::new())),
            loaded,
            Arc::new(LanguageDetector::new(&[en, es], 0.6)),
            Arc::new(CaptionProcessor::new(0.5, 10)),
            Arc::new(Mutex::new(HashSet::new())),
            Arc::new(AtomicBool::new(true)),
        )
    }

    #[test]
    fn set_active_languages_rejects_empty_intersection() {
        let cp = make_control_plane();
        let fr = LanguageCode::new("fr");
        let result = cp.set_active_languages(&[fr]);
        assert!(result.is_err());
        // Previous (initial, all-loaded) set is unchanged.
        assert_eq!(cp.status().active_languages.len(), 2);
    }

    #[test]
    fn set_active_languages_filters_to_loaded() {
        let cp = make_control_plane();
        let en = LanguageCode::new("en");
        let fr = LanguageCode::new("fr");
        let result = cp.set_active_languages(&[en.clone(), fr]);
        assert!(result.is_ok());
        assert_eq!(cp.status().active_languages, vec![en]);
    }

    #[test]
    fn force_language_rejects_unloaded_language() {
        let cp = make_control_plane();
        let fr = LanguageCode::new("fr");
        assert!(cp.force_language(&fr).is_err());
    }

    #[test]
    fn shutdown_is_idempotent() {
        let cp = make_control_plane();
        assert!(cp.shutdown().is_ok());
        assert!(cp.shutdown().is_ok());
        assert!(!cp.status().running);
    }

    #[test]
    fn confidence_threshold_rejects_out_of_range() {
        let cp = make_control_plane();
        assert!(cp.set_confidence_threshold(2.0).is_err());
        assert!(cp.set_confidence_threshold(0.3).is_ok());
    }
}
