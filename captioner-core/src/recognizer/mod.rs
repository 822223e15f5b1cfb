//! The acoustic-model loader contract (§6): a black-box, per-language
//! incremental recognizer.
//!
//! A `Recognizer` is single-owner, single-threaded — only the dispatch loop
//! ever mutates one. The trait exposes exactly the capability set the
//! dispatch loop needs: `accept`, `partial`, `reset`. Everything about the
//! underlying acoustic model (how it was trained, what library loaded it) is
//! hidden behind this boundary; untyped JSON never crosses it.

pub mod bank;
pub mod stub;

use crate::audio::AudioFrame;
use crate::error::Result;

/// `(text, confidence)` for a single recognized word.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct WordScore {
    pub text: String,
    pub confidence: f32,
}

impl WordScore {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
        }
    }
}

/// A completed utterance: immutable once emitted.
#[derive(Debug, Clone, Default)]
pub struct FinalResult {
    pub text: String,
    pub words: Vec<WordScore>,
}

/// An interim, mutable hypothesis for the in-progress utterance.
#[derive(Debug, Clone, Default)]
pub struct PartialResult {
    pub text: String,
    pub words: Vec<WordScore>,
}

/// Capability set a loaded acoustic model binding must expose.
///
/// `Send` because a bank of these is built on one thread and handed to the
/// dedicated dispatch thread; `single-owner, single-threaded` after that
/// handoff is enforced by construction — nothing wraps these in `Arc`.
pub trait Recognizer: Send {
    /// Feed one fixed-size PCM frame. Returns `Some(FinalResult)` when the
    /// recognizer judges the current utterance complete, `None` to signal
    /// "needs more audio" (mirrors the acoustic loader's
    /// `{Final(json) | NeedsMore}` contract, §6).
    fn accept(&mut self, frame: &AudioFrame) -> Result<Option<FinalResult>>;

    /// The current in-progress hypothesis. Always available, even with no
    /// audio accepted yet (empty text).
    fn partial(&self) -> PartialResult;

    /// Forget the in-progress utterance, returning to a fresh `Idle` state.
    fn reset(&mut self);
}
