//! `Captioner` — top-level lifecycle controller (§4.6 Ambient).
//!
//! A single handle that owns every subsystem, exposes `new`/`start`/`stop`,
//! and hands out broadcast receivers for live events rather than requiring
//! callers to poll. Unlike a single-model/single-VAD engine, this
//! coordinator owns a `RecognizerBank` of several simultaneously-loaded
//! languages and threads its frames through `DispatchLoop`.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::info;

use crate::audio::{AudioSource, FrameConsumer};
use crate::caption::CaptionProcessor;
use crate::config::CaptionerConfig;
use crate::control::{ControlPlane, EngineStatus};
use crate::detector::LanguageDetector;
use crate::dispatch::{self, DispatchContext, DispatchDiagnostics, DispatchDiagnosticsSnapshot};
use crate::error::{CaptionerError, Result};
use crate::events::CaptionEvent;
use crate::lang::LanguageCode;
use crate::recognizer::bank::{RecognizerBank, RecognizerFactory, StubRecognizerFactory};

/// Broadcast channel capacity for `CaptionEvent` — sized for a slow
/// consumer to lag a couple hundred events behind without losing any.
const EVENT_BROADCAST_CAPACITY: usize = 256;

/// Owns every subsystem named in §3-§5 and wires them the way DispatchLoop,
/// ControlPlane, and AudioSource expect: the recognizer bank is built once at
/// construction, then handed by value to the dispatch thread on `start()` and
/// never touched again from this struct.
pub struct Captioner {
    audio: Arc<Mutex<AudioSource>>,
    bank: Mutex<Option<RecognizerBank>>,
    consumer: Mutex<Option<FrameConsumer>>,
    detector: Arc<LanguageDetector>,
    caption: Arc<CaptionProcessor>,
    active_languages: Arc<Mutex<HashSet<LanguageCode>>>,
    running: Arc<AtomicBool>,
    control: ControlPlane,
    event_tx: broadcast::Sender<CaptionEvent>,
    diagnostics: Arc<DispatchDiagnostics>,
    dispatch_handle: Mutex<Option<JoinHandle<()>>>,
    detection_threshold: f32,
    initial_finalization_threshold: usize,
}

impl Captioner {
    /// Build an engine with no real acoustic-model binding — every loaded
    /// language finalizes on a fixed sample count (`StubRecognizer`). Useful
    /// for a headless bridge with no recognizer library linked in yet.
    pub fn new(config: CaptionerConfig) -> Result<Self> {
        Self::with_factory(config, &StubRecognizerFactory)
    }

    /// Build an engine against a caller-supplied acoustic-model binding.
    pub fn with_factory(config: CaptionerConfig, factory: &dyn RecognizerFactory) -> Result<Self> {
        let language_paths: Vec<(LanguageCode, std::path::PathBuf)> = config
            .language_model_paths()
            .into_iter()
            .map(|(name, path)| (LanguageCode::new(name), path))
            .collect();

        let bank = RecognizerBank::load(&language_paths, config.audio.sample_rate, factory)?;
        let loaded = bank.loaded_languages();

        let mut audio_source = AudioSource::new();
        let consumer = audio_source.frames();
        let audio = Arc::new(Mutex::new(audio_source));

        let detector = Arc::new(LanguageDetector::new(
            &loaded,
            config.processing.language_detection_threshold,
        ));
        let caption = Arc::new(CaptionProcessor::new(
            config.audio.confidence_threshold,
            config.ui.history_limit,
        ));
        let active_languages: Arc<Mutex<HashSet<LanguageCode>>> =
            Arc::new(Mutex::new(loaded.iter().cloned().collect()));
        let running = Arc::new(AtomicBool::new(false));
        let (event_tx, _) = broadcast::channel(EVENT_BROADCAST_CAPACITY);
        let diagnostics = Arc::new(DispatchDiagnostics::default());

        let control = ControlPlane::new(
            Arc::clone(&audio),
            loaded,
            Arc::clone(&detector),
            Arc::clone(&caption),
            Arc::clone(&active_languages),
            Arc::clone(&running),
        );

        Ok(Self {
            audio,
            bank: Mutex::new(Some(bank)),
            consumer: Mutex::new(Some(consumer)),
            detector,
            caption,
            active_languages,
            running,
            control,
            event_tx,
            diagnostics,
            dispatch_handle: Mutex::new(None),
            detection_threshold: config.processing.language_detection_threshold,
            initial_finalization_threshold: config.processing.initial_finalization_threshold,
        })
    }

    /// Spawn the dispatch thread and open the capture device. Idempotent —
    /// a second call while already running is a no-op.
    pub async fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let bank = self
            .bank
            .lock()
            .take()
            .ok_or_else(|| CaptionerError::Other(anyhow::anyhow!("dispatch already started")))?;
        let consumer = self
            .consumer
            .lock()
            .take()
            .ok_or_else(|| CaptionerError::Other(anyhow::anyhow!("frame consumer already taken")))?;

        let mut ctx = DispatchContext::new(
            bank,
            consumer,
            Arc::clone(&self.detector),
            Arc::clone(&self.caption),
            Arc::clone(&self.active_languages),
            Arc::clone(&self.running),
            self.event_tx.clone(),
        );
        ctx.diagnostics = Arc::clone(&self.diagnostics);
        ctx.detection_threshold = self.detection_threshold;
        ctx.initial_finalization_threshold = self.initial_finalization_threshold;

        let handle = std::thread::spawn(move || dispatch::run(ctx));
        *self.dispatch_handle.lock() = Some(handle);

        if let Err(e) = self.audio.lock().start().await {
            self.running.store(false, Ordering::Release);
            return Err(e);
        }

        info!("captioner started");
        Ok(())
    }

    /// Signal the dispatch loop and audio capture to stop. Does not block on
    /// the dispatch thread exiting — call [`Self::join`] for that.
    pub fn shutdown(&self) -> Result<()> {
        self.control.shutdown()
    }

    /// Block until the dispatch thread (if one was spawned) has exited.
    pub fn join(&self) {
        if let Some(handle) = self.dispatch_handle.lock().take() {
            let _ = handle.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// New receiver on the shared event broadcast — each subscriber sees
    /// every event from the point of subscription onward (§4.3, §6).
    pub fn subscribe_events(&self) -> broadcast::Receiver<CaptionEvent> {
        self.event_tx.subscribe()
    }

    pub fn dispatch_diagnostics(&self) -> DispatchDiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    // ── ControlPlane passthrough (§4.6) ──────────────────────────────────

    pub fn status(&self) -> EngineStatus {
        self.control.status()
    }

    pub fn set_active_languages(&self, requested: &[LanguageCode]) -> Result<()> {
        self.control.set_active_languages(requested)
    }

    pub fn force_language(&self, lang: &LanguageCode) -> Result<()> {
        self.control.force_language(lang)
    }

    pub fn reset_language_detection(&self) -> Result<()> {
        self.control.reset_language_detection()
    }

    pub async fn select_device(&self, device_index: usize) -> Result<()> {
        self.control.select_device(device_index).await
    }

    pub fn clear_history(&self, lang: Option<&LanguageCode>) -> Result<()> {
        self.control.clear_history(lang)
    }

    pub fn set_confidence_threshold(&self, threshold: f32) -> Result<()> {
        self.control.set_confidence_threshold(threshold)
    }

    pub fn list_devices(&self) -> Vec<crate::audio::DeviceInfo> {
        self.audio.lock().list_devices()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn config_with(langs: &[&str]) -> CaptionerConfig {
        let mut config = CaptionerConfig::default();
        config.languages = langs
            .iter()
            .map(|l| (format!("{l}_model"), PathBuf::from(format!("models/{l}"))))
            .collect::<HashMap<_, _>>();
        config
    }

    #[test]
    fn new_loads_configured_languages_as_initially_active() {
        let captioner = Captioner::new(config_with(&["en", "es"])).unwrap();
        let status = captioner.status();
        assert_eq!(status.loaded_languages.len(), 2);
        assert_eq!(status.active_languages.len(), 2);
        assert!(!status.running);
    }

    #[test]
    fn set_active_languages_delegates_to_control_plane() {
        let captioner = Captioner::new(config_with(&["en", "es"])).unwrap();
        let en = LanguageCode::new("en");
        assert!(captioner.set_active_languages(&[en.clone()]).is_ok());
        assert_eq!(captioner.status().active_languages, vec![en]);
    }

    #[test]
    fn shutdown_is_idempotent_and_does_not_require_start() {
        let captioner = Captioner::new(config_with(&["en"])).unwrap();
        assert!(captioner.shutdown().is_ok());
        assert!(captioner.shutdown().is_ok());
        assert!(!captioner.is_running());
    }

    #[test]
    fn subscribe_events_returns_a_live_receiver() {
        let captioner = Captioner::new(config_with(&["en"])).unwrap();
        let mut rx = captioner.subscribe_events();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn no_configured_languages_is_a_construction_error() {
        let result = Captioner::new(CaptionerConfig::default());
        assert!(result.is_err());
    }
}
