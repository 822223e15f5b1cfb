//! Typed configuration surface (§6 Ambient).
//!
//! The configuration file reader is an out-of-scope external collaborator,
//! but a binary embedding this crate still needs *some* concrete settings
//! source. `CaptionerConfig` covers the `[audio]`/`[processing]`/
//! `[languages]`/`[ui]` sections, loaded as a struct literal default,
//! optionally overridden by a TOML file on disk, with `serde`-derived
//! (de)serialization rather than hand-rolled key lookups.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CaptionerError, Result};

/// `[audio]` section (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub chunk_size: usize,
    /// Live-mutable via ControlPlane after startup (§6).
    pub confidence_threshold: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            channels: 1,
            chunk_size: crate::audio::DEFAULT_FRAME_SIZE,
            confidence_threshold: crate::caption::DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }
}

/// `[processing]` section (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    pub initial_finalization_threshold: usize,
    /// Carried in the config surface with no behavioral contract (§9 Open
    /// Question): retained verbatim, never read by DispatchLoop.
    pub long_sentence_threshold: usize,
    pub enable_word_timestamps: bool,
    pub language_detection_threshold: f32,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            initial_finalization_threshold: 4,
            long_sentence_threshold: 10,
            enable_word_timestamps: true,
            language_detection_threshold: 0.6,
        }
    }
}

/// `[ui]` section (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub history_limit: usize,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            history_limit: crate::caption::DEFAULT_HISTORY_LIMIT,
        }
    }
}

/// Top-level configuration, read once at startup. `audio.confidence_threshold`
/// is the only field mutated after load (via `ControlPlane::set_confidence_threshold`) — everything else is consumed once
/// during `Captioner::new` and has no live-update path (§6).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CaptionerConfig {
    pub audio: AudioConfig,
    pub processing: ProcessingConfig,
    pub ui: UiConfig,
    /// `languages.<name>_model` — filesystem path per language (§6).
    pub languages: HashMap<String, PathBuf>,
}

impl CaptionerConfig {
    /// `languages.<name>_model` keys, normalized back to bare language codes
    /// (`"english_model"` -> `"english"`) paired with their configured path.
    pub fn language_model_paths(&self) -> Vec<(String, PathBuf)> {
        self.languages
            .iter()
            .filter_map(|(key, path)| {
                key.strip_suffix("_model").map(|lang| (lang.to_string(), path.clone()))
            })
            .collect()
    }

    /// Load layered config: a struct-literal default, overridden by an
    /// optional TOML file at `path` if it exists, overridden last by
    /// `CAPTIONER_*` environment variables for the handful of fields
    /// operators most often need to tweak without editing a file.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path)?;
            toml::from_str(&raw)
                .map_err(|e| CaptionerError::Config(format!("invalid config at {}: {e}", path.display())))?
        } else {
            tracing::warn!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("CAPTIONER_AUDIO_SAMPLE_RATE") {
            if let Ok(n) = v.parse() {
                self.audio.sample_rate = n;
            }
        }
        if let Ok(v) = std::env::var("CAPTIONER_CONFIDENCE_THRESHOLD") {
            if let Ok(n) = v.parse() {
                self.audio.confidence_threshold = n;
            }
        }
        if let Ok(v) = std::env::var("CAPTIONER_DETECTION_THRESHOLD") {
            if let Ok(n) = v.parse() {
                self.processing.language_detection_threshold = n;
            }
        }
        if let Ok(v) = std::env::var("CAPTIONER_HISTORY_LIMIT") {
            if let Ok(n) = v.parse() {
                self.ui.history_limit = n;
            }
        }
    }

    /// Fatal at startup (§7: "ConfigError — missing/invalid settings.").
    fn validate(&self) -> Result<()> {
        if self.audio.sample_rate == 0 {
            return Err(CaptionerError::Config("audio.sample_rate must be non-zero".to_string()));
        }
        if self.audio.chunk_size == 0 {
            return Err(CaptionerError::Config("audio.chunk_size must be non-zero".to_string()));
        }
        if !(0.0..=1.0).contains(&self.audio.confidence_threshold) {
            return Err(CaptionerError::Config(
                "audio.confidence_threshold must be in [0, 1]".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.processing.language_detection_threshold) {
            return Err(CaptionerError::Config(
                "processing.language_detection_threshold must be in [0, 1]".to_string(),
            ));
        }
        if self.languages.is_empty() {
            return Err(CaptionerError::Config(
                "at least one languages.<name>_model entry is required".to_string(),
            ));
        }
        Ok(())
    }
}
