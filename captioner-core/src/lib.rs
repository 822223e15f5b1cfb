//! # captioner-core
//!
//! Real-time, multi-language live-captioning engine.
//!
//! ## Architecture
//!
//! ```text
//! Microphone → AudioSource (capture + resample) → bounded frame channel
//!                                                       │
//!                                              DispatchLoop (own thread)
//!                                        routes each frame to a RecognizerBank
//!                                        subset, scored by LanguageDetector
//!                                                       │
//!                                    CaptionProcessor (filter, history, stats)
//!                                                       │
//!                                       broadcast::Sender<CaptionEvent>
//! ```
//!
//! `ControlPlane` is the synchronous command surface a host process drives —
//! device selection, active-language filtering, forcing a language, clearing
//! history, and adjusting the confidence floor — without ever touching the
//! dispatch thread's owned `RecognizerBank` directly.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod caption;
pub mod config;
pub mod control;
pub mod detector;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod events;
pub mod lang;
pub mod recognizer;

// Convenience re-exports for downstream crates (the host-bridge binary and
// any embedder).
pub use config::CaptionerConfig;
pub use control::EngineStatus;
pub use engine::Captioner;
pub use error::{CaptionerError, Result};
pub use events::{CaptionEvent, HostCommand, HostMessage};
pub use lang::LanguageCode;
