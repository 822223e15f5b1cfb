//! Audio device enumeration (§4.1: `list_devices()` — pure read).

use serde::{Deserialize, Serialize};

/// `(opaque_index, human_name, max_input_channels, default_sample_rate, is_default)`
/// as a named struct instead of a bare tuple, plus the loopback/mic
/// heuristic flags used to sort the list best-first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub index: usize,
    pub name: String,
    pub max_input_channels: u16,
    pub default_sample_rate: u32,
    pub is_default: bool,
    /// Heuristic flag for devices that likely capture system/output audio
    /// rather than a microphone.
    pub is_loopback_like: bool,
    /// Heuristic recommendation for the best speech-microphone input.
    pub is_recommended: bool,
}

const LOOPBACK_KEYWORDS: &[&str] = &[
    "stereo mix",
    "wave out",
    "what u hear",
    "what you hear",
    "loopback",
    "virtual output",
    "monitor of",
    "mixage stereo",
    "mezcla estereo",
    "mix stereo",
    "speakers (",
    "headphones (",
];

const MIC_POSITIVE_KEYWORDS: &[&str] = &[
    "microphone",
    "mic",
    "array",
    "headset",
    "headphone mic",
    "input",
    "line in",
    "usb",
    "webcam",
    "yeti",
    "podcast",
];

/// Best-effort heuristic for loopback/system-output capture devices. Feeds
/// `DeviceInfo::is_loopback_like` and `mic_preference_score` below.
pub fn is_loopback_like_name(name: &str) -> bool {
    let lowered = name.trim().to_ascii_lowercase();
    LOOPBACK_KEYWORDS.iter().any(|k| lowered.contains(k))
}

/// Score a device name for likely speech-microphone intent. Higher is
/// better; non-loopback devices are always preferred.
pub fn mic_preference_score(name: &str) -> i32 {
    let lowered = name.trim().to_ascii_lowercase();
    let mut score = 0;
    if !is_loopback_like_name(&lowered) {
        score += 8;
    } else {
        score -= 16;
    }
    if MIC_POSITIVE_KEYWORDS.iter().any(|k| lowered.contains(k)) {
        score += 6;
    }
    if lowered.contains("default") {
        score += 1;
    }
    score
}

/// List all available audio input devices on the system, sorted best-first
/// (recommended, then non-loopback, then default, then name) so a caller
/// presenting the list to a human can just take the first entry.
///
/// Returns an empty `Vec` if cpal is unavailable or no devices exist —
/// `select()` surfaces that as `DeviceError::Unavailable` rather than this
/// function failing. `index` is the device's opaque position in cpal's own
/// enumeration order, independent of where it lands in the sorted `Vec`, so
/// it remains valid for `AudioSource::select`.
#[cfg(feature = "audio-cpal")]
pub fn list_input_devices() -> Vec<DeviceInfo> {
    use cpal::traits::{DeviceTrait, HostTrait};

    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    let mut list = match host.input_devices() {
        Ok(devices) => devices
            .enumerate()
            .map(|(idx, device)| {
                let name = device
                    .name()
                    .unwrap_or_else(|_| format!("Input Device {}", idx + 1));
                let is_default = default_name.as_deref() == Some(name.as_str());
                let config = device.default_input_config().ok();
                let max_input_channels = config.as_ref().map(|c| c.channels()).unwrap_or(1);
                let default_sample_rate =
                    config.as_ref().map(|c| c.sample_rate().0).unwrap_or(16_000);
                let is_loopback_like = is_loopback_like_name(&name);
                DeviceInfo {
                    index: idx,
                    name,
                    max_input_channels,
                    default_sample_rate,
                    is_default,
                    is_loopback_like,
                    is_recommended: false,
                }
            })
            .collect::<Vec<_>>(),
        Err(e) => {
            tracing::warn!(error = %e, "failed to enumerate input devices");
            Vec::new()
        }
    };

    if let Some((best_idx, _)) = list.iter().enumerate().max_by_key(|(_, d)| {
        mic_preference_score(&d.name) + if d.is_default { 2 } else { 0 }
    }) {
        if let Some(best) = list.get_mut(best_idx) {
            best.is_recommended = true;
        }
    }

    list.sort_by_key(|d| {
        (
            !d.is_recommended,
            d.is_loopback_like,
            !d.is_default,
            d.name.to_ascii_lowercase(),
        )
    });

    list
}

#[cfg(not(feature = "audio-cpal"))]
pub fn list_input_devices() -> Vec<DeviceInfo> {
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::{is_loopback_like_name, mic_preference_score};

    #[test]
    fn detects_common_loopback_names() {
        assert!(is_loopback_like_name("Stereo Mix (Realtek Audio)"));
        assert!(is_loopback_like_name("What U Hear (Sound Blaster)"));
        assert!(is_loopback_like_name(
            "Speakers (High Definition Audio Device)"
        ));
    }

    #[test]
    fn scores_mic_higher_than_loopback() {
        let mic = mic_preference_score("Microphone Array (USB PnP Audio Device)");
        let loopback = mic_preference_score("Stereo Mix (Realtek Audio)");
        assert!(mic > loopback);
    }
}
