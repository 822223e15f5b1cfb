//! Internal caption events and the host-bridge wire format (§4.3, §6).
//!
//! `CaptionEvent` is what DispatchLoop emits internally (fed synchronously
//! to `CaptionProcessor`/`LanguageDetector`, and broadcast for any external
//! listener). `HostMessage`/`HostCommand` are the newline-delimited-JSON
//! shapes the headless host bridge (`captioner-cli`) reads/writes on
//! stdin/stdout, tagged with `rename_all = "snake_case"` so the wire shape
//! stays a flat, self-describing JSON object per line (§6).

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::lang::LanguageCode;
use crate::recognizer::WordScore;

/// Emitted by DispatchLoop for each language's per-frame state transition.
#[derive(Debug, Clone)]
pub enum CaptionEvent {
    /// A completed utterance (§4.3: "emit `CaptionEvent::Final(lang, text, words)`").
    Final {
        language: LanguageCode,
        text: String,
        words: Vec<WordScore>,
    },
    /// An in-progress hypothesis (§4.3: "emit `CaptionEvent::Preview(lang, partial_text, words)`").
    Preview {
        language: LanguageCode,
        text: String,
        words: Vec<WordScore>,
    },
}

impl CaptionEvent {
    pub fn language(&self) -> &LanguageCode {
        match self {
            Self::Final { language, .. } | Self::Preview { language, .. } => language,
        }
    }

    /// Convert to the host bridge's wire shape, stamping the current time.
    pub fn into_host_message(self) -> HostMessage {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);

        match self {
            Self::Final {
                language,
                text,
                words,
            } => HostMessage::Transcription {
                text,
                is_final: true,
                language,
                confidence: words.into_iter().map(|w| w.confidence).collect(),
                timestamp,
            },
            Self::Preview {
                language,
                text,
                words,
            } => HostMessage::Transcription {
                text,
                is_final: false,
                language,
                confidence: words.into_iter().map(|w| w.confidence).collect(),
                timestamp,
            },
        }
    }
}

/// One line of newline-delimited JSON written to stdout (§6: "Host bridge").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostMessage {
    /// `{"type":"status","message":"ready"}` once initialized, and on later
    /// lifecycle transitions.
    Status { message: String },
    /// `{"type":"transcription","text":..,"is_final":bool,"language":..,"confidence":[..],"timestamp":..}`
    Transcription {
        text: String,
        is_final: bool,
        language: LanguageCode,
        confidence: Vec<f32>,
        timestamp: f64,
    },
    /// Non-fatal runtime error surfaced to the host process.
    Error { message: String },
}

/// One line of newline-delimited JSON read from stdin (§6, §4.6).
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum HostCommand {
    SetLanguages { languages: Vec<LanguageCode> },
    ForceLanguage { language: LanguageCode },
    ResetLanguageDetection,
    SelectDevice { index: usize },
    ClearHistory { language: Option<LanguageCode> },
    SetConfidenceThreshold { threshold: f32 },
    Status,
    Shutdown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn final_event_becomes_transcription_message() {
        let event = CaptionEvent::Final {
            language: LanguageCode::new("en"),
            text: "hello world".to_string(),
            words: vec![WordScore::new("hello", 0.9), WordScore::new("world", 0.8)],
        };
        let msg = event.into_host_message();
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "transcription");
        assert_eq!(json["is_final"], true);
        assert_eq!(json["text"], "hello world");
        assert_eq!(json["language"], "en");
        assert_eq!(json["confidence"][0], 0.9);
    }

    #[test]
    fn status_message_serializes_with_snake_case_type_tag() {
        let msg = HostMessage::Status {
            message: "ready".to_string(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "status");
        assert_eq!(json["message"], "ready");
    }

    #[test]
    fn set_languages_command_parses_from_json() {
        let line = r#"{"command":"set_languages","languages":["en","es"]}"#;
        let cmd: HostCommand = serde_json::from_str(line).unwrap();
        match cmd {
            HostCommand::SetLanguages { languages } => {
                assert_eq!(languages, vec![LanguageCode::new("en"), LanguageCode::new("es")]);
            }
            _ => panic!("expected SetLanguages"),
        }
    }

    #[test]
    fn shutdown_command_parses_with_no_payload() {
        let line = r#"{"command":"shutdown"}"#;
        let cmd: HostCommand = serde_json::from_str(line).unwrap();
        assert!(matches!(cmd, HostCommand::Shutdown));
    }
}
