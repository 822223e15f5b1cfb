//! The central dispatch state machine (§4.3).
//!
//! Runs on one dedicated worker thread: a `DispatchContext` struct bundles
//! everything the loop needs, `DispatchDiagnostics` tracks frame/event
//! counters as atomics, and a `tokio::sync::broadcast` channel fans events
//! out to any listener. Unlike a single-model pipeline with one VAD+model
//! pair, this loop fans one frame out to a *routing set* of
//! simultaneously-live recognizers, one per candidate language.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{error, warn};

use crate::audio::FrameConsumer;
use crate::caption::CaptionProcessor;
use crate::detector::LanguageDetector;
use crate::events::CaptionEvent;
use crate::lang::LanguageCode;
use crate::recognizer::bank::RecognizerBank;

/// Default receive timeout per iteration (§5: "blocks on channel receive
/// with a bounded timeout (≤ 100 ms)").
const RECV_TIMEOUT: Duration = Duration::from_millis(100);

/// Default `initial_finalization_threshold` (§6, §4.3): partials at or
/// below this many words are reported as "..." rather than their own text.
const DEFAULT_INITIAL_FINALIZATION_THRESHOLD: usize = 4;

/// Default `language_detection_threshold` (§6).
const DEFAULT_DETECTION_THRESHOLD: f32 = 0.6;

/// A monitoring language is added to the routing set only while the
/// detector's confidence in the primary language stays below this.
const MONITORING_CONFIDENCE_CEILING: f32 = 0.8;

#[derive(Default)]
pub struct DispatchDiagnostics {
    pub frames_in: AtomicUsize,
    pub frames_routed: AtomicUsize,
    pub finals_emitted: AtomicUsize,
    pub previews_emitted: AtomicUsize,
    pub recognizer_errors: AtomicUsize,
}

impl DispatchDiagnostics {
    pub fn snapshot(&self) -> DispatchDiagnosticsSnapshot {
        DispatchDiagnosticsSnapshot {
            frames_in: self.frames_in.load(Ordering::Relaxed),
            frames_routed: self.frames_routed.load(Ordering::Relaxed),
            finals_emitted: self.finals_emitted.load(Ordering::Relaxed),
            previews_emitted: self.previews_emitted.load(Ordering::Relaxed),
            recognizer_errors: self.recognizer_errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DispatchDiagnosticsSnapshot {
    pub frames_in: usize,
    pub frames_routed: usize,
    pub finals_emitted: usize,
    pub previews_emitted: usize,
    pub recognizer_errors: usize,
}

/// All context the dispatch loop needs, passed as one struct (mirrors
/// `PipelineContext`'s "closure stays tidy" rationale).
pub struct DispatchContext {
    pub bank: RecognizerBank,
    pub consumer: FrameConsumer,
    pub detector: Arc<LanguageDetector>,
    pub caption: Arc<CaptionProcessor>,
    pub active_languages: Arc<Mutex<HashSet<LanguageCode>>>,
    pub running: Arc<AtomicBool>,
    pub event_tx: broadcast::Sender<CaptionEvent>,
    pub diagnostics: Arc<DispatchDiagnostics>,
    pub detection_threshold: f32,
    pub initial_finalization_threshold: usize,
}

impl DispatchContext {
    pub fn new(
        bank: RecognizerBank,
        consumer: FrameConsumer,
        detector: Arc<LanguageDetector>,
        caption: Arc<CaptionProcessor>,
        active_languages: Arc<Mutex<HashSet<LanguageCode>>>,
        running: Arc<AtomicBool>,
        event_tx: broadcast::Sender<CaptionEvent>,
    ) -> Self {
        Self {
            bank,
            consumer,
            detector,
            caption,
            active_languages,
            running,
            event_tx,
            diagnostics: Arc::new(DispatchDiagnostics::default()),
            detection_threshold: DEFAULT_DETECTION_THRESHOLD,
            initial_finalization_threshold: DEFAULT_INITIAL_FINALIZATION_THRESHOLD,
        }
    }
}

/// Compute the routing set R for the current frame (§4.3 step 2).
fn compute_routing_set(
    loaded: &[LanguageCode],
    active: &HashSet<LanguageCode>,
    detected: Option<LanguageCode>,
    confidence: f32,
    detection_threshold: f32,
) -> HashSet<LanguageCode> {
    let mut r: HashSet<LanguageCode> = match detected {
        None => loaded.iter().cloned().collect(),
        Some(_) if confidence < detection_threshold => loaded.iter().cloned().collect(),
        Some(primary) => {
            let mut set = HashSet::new();
            set.insert(primary.clone());
            if confidence < MONITORING_CONFIDENCE_CEILING {
                if let Some(extra) = loaded.iter().find(|l| **l != primary) {
                    set.insert(extra.clone());
                }
            }
            set
        }
    };

    r.retain(|lang| active.contains(lang));
    if r.is_empty() {
        r = active.clone();
    }
    r
}

/// Run the dispatch loop until `ctx.running` becomes false.
///
/// Intended to be spawned on its own `std::thread` (the recognizer bank is
/// `Send` but not `Sync`, and this loop is its sole owner for the duration
/// of the run).
pub fn run(mut ctx: DispatchContext) {
    tracing::info!("dispatch loop started");

    while ctx.running.load(Ordering::Relaxed) {
        let Some(frame) = ctx.consumer.recv_timeout(RECV_TIMEOUT) else {
            continue;
        };
        ctx.diagnostics.frames_in.fetch_add(1, Ordering::Relaxed);

        let loaded = ctx.bank.loaded_languages();
        let (detected, confidence) = ctx.detector.state();
        let active = ctx.active_languages.lock().clone();
        let routing = compute_routing_set(&loaded, &active, detected, confidence, ctx.detection_threshold);
        ctx.diagnostics
            .frames_routed
            .fetch_add(routing.len(), Ordering::Relaxed);

        for lang in &routing {
            let Some(recognizer) = ctx.bank.get_mut(lang) else {
                continue;
            };

            match recognizer.accept(&frame) {
                Ok(Some(final_result)) if !final_result.text.trim().is_empty() => {
                    let _span = tracing::info_span!("utterance", language = %lang).entered();
                    tracing::info!(text = %final_result.text, "utterance finalized");
                    ctx.diagnostics.finals_emitted.fetch_add(1, Ordering::Relaxed);
                    let confidences: Vec<f32> =
                        final_result.words.iter().map(|w| w.confidence).collect();
                    if !confidences.is_empty() {
                        ctx.detector.record_final(lang, &confidences);
                    }
                    ctx.caption
                        .submit_final(lang, final_result.text.clone(), final_result.words.clone());
                    let _ = ctx.event_tx.send(CaptionEvent::Final {
                        language: lang.clone(),
                        text: final_result.text,
                        words: final_result.words,
                    });
                }
                Ok(Some(_)) => {
                    // Final with empty text — treated as no result (§4.3 implies
                    // only non-empty finals are emitted).
                }
                Ok(None) => {
                    let partial = recognizer.partial();
                    let (text, words) = if partial.words.len() <= ctx.initial_finalization_threshold {
                        ("...".to_string(), Vec::new())
                    } else {
                        (partial.text, partial.words)
                    };
                    ctx.diagnostics
                        .previews_emitted
                        .fetch_add(1, Ordering::Relaxed);
                    ctx.caption.submit_preview(lang, text.clone(), words.clone());
                    let _ = ctx.event_tx.send(CaptionEvent::Preview {
                        language: lang.clone(),
                        text,
                        words,
                    });
                }
                Err(e) => {
                    warn!(language = %lang, error = %e, "recognizer error, skipping frame");
                    ctx.diagnostics
                        .recognizer_errors
                        .fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    tracing::info!("dispatch loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{create_frame_channel, AudioFrame};
    use crate::error::Result;
    use crate::recognizer::{FinalResult, PartialResult, Recognizer, WordScore};
    use std::collections::VecDeque;
    use std::time::Instant;
    use tokio::sync::broadcast::error::TryRecvError;

    /// A `Recognizer` driven entirely by a pre-scripted queue of responses.
    struct ScriptedRecognizer {
        responses: VecDeque<Option<FinalResult>>,
        partial_words: usize,
    }

    impl ScriptedRecognizer {
        fn new(responses: Vec<Option<FinalResult>>) -> Self {
            Self {
                responses: responses.into(),
                partial_words: 0,
            }
        }
    }

    impl Recognizer for ScriptedRecognizer {
        fn accept(&mut self, _frame: &AudioFrame) -> Result<Option<FinalResult>> {
            let next = self.responses.pop_front().unwrap_or(None);
            if next.is_none() {
                self.partial_words += 1;
            } else {
                self.partial_words = 0;
            }
            Ok(next)
        }

        fn partial(&self) -> PartialResult {
            if self.partial_words == 0 {
                return PartialResult::default();
            }
            PartialResult {
                text: "partial hypothesis text here".to_string(),
                words: (0..self.partial_words)
                    .map(|i| WordScore::new(format!("w{i}"), 0.9))
                    .collect(),
            }
        }

        fn reset(&mut self) {
            self.partial_words = 0;
        }
    }

    struct SingleLangFactory {
        responses: Mutex<Option<Vec<Option<FinalResult>>>>,
    }

    impl crate::recognizer::bank::RecognizerFactory for SingleLangFactory {
        fn load(
            &self,
            _lang: &LanguageCode,
            _model_path: &std::path::Path,
            _sample_rate: u32,
        ) -> Result<Box<dyn Recognizer>> {
            let responses = self.responses.lock().take().unwrap_or_default();
            Ok(Box::new(ScriptedRecognizer::new(responses)))
        }
    }

    fn recv_with_timeout(
        rx: &mut broadcast::Receiver<CaptionEvent>,
        timeout: Duration,
    ) -> CaptionEvent {
        let start = Instant::now();
        loop {
            match rx.try_recv() {
                Ok(ev) => return ev,
                Err(TryRecvError::Empty) => {
                    if start.elapsed() >= timeout {
                        panic!("timed out waiting for caption event");
                    }
                    std::thread::sleep(Duration::from_millis(5));
                }
                Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Closed) => panic!("event channel closed unexpectedly"),
            }
        }
    }

    fn frame() -> AudioFrame {
        AudioFrame::new(vec![0i16; 160], 16_000)
    }

    #[test]
    fn emits_preview_then_final_for_single_language() {
        let en = LanguageCode::new("en");
        let responses = vec![
            None,
            Some(FinalResult {
                text: "hello world".to_string(),
                words: vec![WordScore::new("hello", 0.9), WordScore::new("world", 0.8)],
            }),
        ];
        let factory = SingleLangFactory {
            responses: Mutex::new(Some(responses)),
        };
        let bank = RecognizerBank::load(
            &[(en.clone(), std::path::PathBuf::from("models/en"))],
            16_000,
            &factory,
        )
        .unwrap();

        let (_producer, consumer) = create_frame_channel(8);
        let detector = Arc::new(LanguageDetector::new(&[en.clone()], 0.6));
        let caption = Arc::new(CaptionProcessor::new(0.0, 10));
        let mut active = HashSet::new();
        active.insert(en.clone());
        let active_languages = Arc::new(Mutex::new(active));
        let running = Arc::new(AtomicBool::new(true));
        let (event_tx, mut event_rx) = broadcast::channel(16);

        let ctx = DispatchContext::new(
            bank,
            consumer,
            detector,
            caption,
            active_languages,
            Arc::clone(&running),
            event_tx,
        );

        _producer.push(frame());
        _producer.push(frame());

        let handle = std::thread::spawn(move || run(ctx));

        let first = recv_with_timeout(&mut event_rx, Duration::from_millis(500));
        match first {
            CaptionEvent::Preview { language, text, .. } => {
                assert_eq!(language, en);
                assert_eq!(text, "...");
            }
            other => panic!("expected Preview first, got {other:?}"),
        }

        let second = recv_with_timeout(&mut event_rx, Duration::from_millis(500));
        match second {
            CaptionEvent::Final { language, text, .. } => {
                assert_eq!(language, en);
                assert_eq!(text, "hello world");
            }
            other => panic!("expected Final second, got {other:?}"),
        }

        running.store(false, Ordering::Release);
        handle.join().unwrap();
    }

    #[test]
    fn routing_set_falls_back_to_active_set_when_intersection_empty() {
        let en = LanguageCode::new("en");
        let es = LanguageCode::new("es");
        let mut active = HashSet::new();
        active.insert(es.clone());

        let routing = compute_routing_set(&[en.clone()], &active, Some(en.clone()), 0.9, 0.6);
        assert_eq!(routing, active);
    }

    #[test]
    fn routing_set_is_all_loaded_languages_when_detection_unknown() {
        let en = LanguageCode::new("en");
        let es = LanguageCode::new("es");
        let mut active = HashSet::new();
        active.insert(en.clone());
        active.insert(es.clone());

        let routing = compute_routing_set(&[en.clone(), es.clone()], &active, None, 0.0, 0.6);
        assert_eq!(routing, active);
    }

    #[test]
    fn routing_set_narrows_to_primary_above_threshold() {
        let en = LanguageCode::new("en");
        let es = LanguageCode::new("es");
        let mut active = HashSet::new();
        active.insert(en.clone());
        active.insert(es.clone());

        // High confidence (>= 0.8) -> no monitoring language added.
        let routing = compute_routing_set(&[en.clone(), es.clone()], &active, Some(en.clone()), 0.95, 0.6);
        let mut expected = HashSet::new();
        expected.insert(en);
        assert_eq!(routing, expected);
    }
}
