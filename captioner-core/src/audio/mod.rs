//! Audio capture via cpal backend.
//!
//! # Design constraints
//!
//! The cpal input callback runs on an OS audio thread at elevated (TIME_CRITICAL on
//! Windows) priority. It **must not**:
//! - Allocate heap memory per sample
//! - Block on a mutex or condvar
//! - Perform I/O
//!
//! This module's callback writes into a small staging buffer and hands whole,
//! fixed-size `AudioFrame`s to the bounded drop-oldest channel in
//! [`channel`] — the only operation that can ever "block" is a `try_send`,
//! which is itself non-blocking.
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms (COM on Windows, CoreAudio on
//! macOS). `AudioCapture` therefore must be created and dropped on the same
//! thread; `AudioSource::start` accomplishes this with `spawn_blocking`.

pub mod channel;
pub mod device;
pub mod resample;

pub use channel::{create_frame_channel, FrameConsumer, FrameProducer};
pub use device::{list_input_devices, DeviceInfo};

#[cfg(feature = "audio-cpal")]
use cpal::{
    traits::{DeviceTrait, StreamTrait},
    SampleFormat, SampleRate, Stream, StreamConfig,
};

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tracing::{error, info, warn};

use crate::error::{CaptionerError, DeviceErrorKind, Result};
use resample::RateConverter;

/// Fixed frame size, in samples, that `AudioSource` hands downstream (§3:
/// "fixed frame size (default 1024 samples)").
pub const DEFAULT_FRAME_SIZE: usize = 1024;

/// Sample rate every `AudioFrame` is normalized to before leaving this
/// module, regardless of the capture device's native rate (§3, §6).
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Default channel capacity, in frames (§5: "capacity ≥ 8 frames").
pub const DEFAULT_CHANNEL_CAPACITY: usize = 32;

/// An immutable, fixed-size buffer of signed 16-bit little-endian PCM
/// samples, mono, at [`TARGET_SAMPLE_RATE`] (§3).
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl AudioFrame {
    pub fn new(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }
}

/// Accumulates resampled f32 samples into fixed-size `i16` frames and pushes
/// each completed frame into a [`FrameProducer`]. Lives entirely on the
/// capture callback's thread.
struct Framer {
    buf: Vec<i16>,
    frame_size: usize,
    sample_rate: u32,
    producer: FrameProducer,
}

impl Framer {
    fn new(frame_size: usize, sample_rate: u32, producer: FrameProducer) -> Self {
        Self {
            buf: Vec::with_capacity(frame_size),
            frame_size,
            sample_rate,
            producer,
        }
    }

    fn push(&mut self, samples: &[f32]) {
        for &s in samples {
            let clamped = s.clamp(-1.0, 1.0);
            self.buf.push((clamped * i16::MAX as f32) as i16);
            if self.buf.len() == self.frame_size {
                let frame = AudioFrame::new(
                    std::mem::replace(&mut self.buf, Vec::with_capacity(self.frame_size)),
                    self.sample_rate,
                );
                self.producer.push(frame);
            }
        }
    }
}

/// Handle to an active audio capture stream.
///
/// **Not `Send`** — `cpal::Stream` is bound to its creation thread on
/// Windows/macOS. Create and drop this type on the same OS thread.
pub struct AudioCapture {
    #[cfg(feature = "audio-cpal")]
    _stream: Stream,
    running: Arc<AtomicBool>,
}

impl AudioCapture {
    /// Open `device_index` (as reported by [`device::list_input_devices`]),
    /// resample to [`TARGET_SAMPLE_RATE`], frame into `frame_size`-sample
    /// chunks, and push each into `producer`.
    #[cfg(feature = "audio-cpal")]
    pub fn open(
        device_index: usize,
        frame_size: usize,
        producer: FrameProducer,
        running: Arc<AtomicBool>,
    ) -> Result<Self> {
        use cpal::traits::HostTrait;

        let host = cpal::default_host();
        let device = host
            .input_devices()
            .map_err(|e| CaptionerError::Device {
                kind: DeviceErrorKind::Unavailable,
                detail: e.to_string(),
            })?
            .nth(device_index)
            .ok_or_else(|| CaptionerError::Device {
                kind: DeviceErrorKind::Unavailable,
                detail: format!("no input device with index {device_index}"),
            })?;

        let name = device
            .name()
            .unwrap_or_else(|_| format!("Input Device {device_index}"));
        info!(device = name.as_str(), "opening input device");

        let supported = device
            .default_input_config()
            .map_err(|e| CaptionerError::Device {
                kind: DeviceErrorKind::InvalidFormat,
                detail: e.to_string(),
            })?;

        let capture_rate = supported.sample_rate().0;
        let channels = supported.channels();
        info!(capture_rate, channels, "audio config selected");

        let config = StreamConfig {
            channels,
            sample_rate: SampleRate(capture_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let resampler = RateConverter::new(capture_rate, TARGET_SAMPLE_RATE, 960)?;
        let framer = Framer::new(frame_size, TARGET_SAMPLE_RATE, producer);

        let running_cb = Arc::clone(&running);

        let stream = match supported.sample_format() {
            SampleFormat::F32 => {
                Self::build_stream::<f32, _>(&device, &config, channels, running_cb, resampler, framer, |s| s)
            }
            SampleFormat::I16 => {
                Self::build_stream::<i16, _>(&device, &config, channels, running_cb, resampler, framer, |s| {
                    s as f32 / 32768.0
                })
            }
            SampleFormat::U8 => {
                Self::build_stream::<u8, _>(&device, &config, channels, running_cb, resampler, framer, |s| {
                    (s as f32 - 128.0) / 128.0
                })
            }
            fmt => {
                return Err(CaptionerError::Device {
                    kind: DeviceErrorKind::InvalidFormat,
                    detail: format!("unsupported sample format: {fmt:?}"),
                })
            }
        }
        .map_err(|e| CaptionerError::Device {
            kind: DeviceErrorKind::InvalidFormat,
            detail: e.to_string(),
        })?;

        stream.play().map_err(|e| CaptionerError::Device {
            kind: DeviceErrorKind::Busy,
            detail: e.to_string(),
        })?;

        Ok(Self {
            _stream: stream,
            running,
        })
    }

    #[cfg(feature = "audio-cpal")]
    fn build_stream<T, F>(
        device: &cpal::Device,
        config: &StreamConfig,
        channels: u16,
        running: Arc<AtomicBool>,
        mut resampler: RateConverter,
        mut framer: Framer,
        to_f32: F,
    ) -> std::result::Result<Stream, cpal::BuildStreamError>
    where
        T: cpal::Sample + cpal::SizedSample,
        F: Fn(T) -> f32 + Send + 'static,
    {
        let ch = channels as usize;
        let mut mono_buf: Vec<f32> = Vec::new();

        device.build_input_stream(
            config,
            move |data: &[T], _info| {
                if !running.load(Ordering::Relaxed) {
                    return;
                }
                let frames = data.len() / ch;
                mono_buf.resize(frames, 0.0);
                if ch == 1 {
                    for (idx, sample) in data.iter().take(frames).enumerate() {
                        mono_buf[idx] = to_f32(*sample);
                    }
                } else {
                    for f in 0..frames {
                        let base = f * ch;
                        let mut sum = 0f32;
                        for c in 0..ch {
                            sum += to_f32(data[base + c]);
                        }
                        mono_buf[f] = sum / ch as f32;
                    }
                }
                let resampled = resampler.process(&mono_buf);
                framer.push(&resampled);
            },
            |err| error!("audio stream error: {err}"),
            None,
        )
    }

    /// Signal the callback to no-op on its next invocation.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}

#[cfg(not(feature = "audio-cpal"))]
impl AudioCapture {
    pub fn open(
        _device_index: usize,
        _frame_size: usize,
        _producer: FrameProducer,
        _running: Arc<AtomicBool>,
    ) -> Result<Self> {
        Err(CaptionerError::Device {
            kind: DeviceErrorKind::Unavailable,
            detail: "compiled without audio-cpal feature".to_string(),
        })
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}

/// Owns the capture lifecycle: device selection and start/stop. The frame
/// channel itself is created once and outlives any number of `select()`/
/// `start()`/`stop()` cycles — only the capture *stream* is torn down and
/// reopened on device reselection, so the dispatch thread's `FrameConsumer`
/// (handed out once via [`Self::frames`]) never goes stale.
pub struct AudioSource {
    selected_device: Option<usize>,
    frame_size: usize,
    producer: FrameProducer,
    consumer: Option<FrameConsumer>,
    capture: Option<AudioCapture>,
    running: Arc<AtomicBool>,
}

impl Default for AudioSource {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSource {
    pub fn new() -> Self {
        let (producer, consumer) = create_frame_channel(DEFAULT_CHANNEL_CAPACITY);
        Self {
            selected_device: None,
            frame_size: DEFAULT_FRAME_SIZE,
            producer,
            consumer: Some(consumer),
            capture: None,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Take the consumer side of the frame channel. Callable exactly once
    /// per `AudioSource` — intended for the dispatch thread to claim at
    /// engine construction time.
    ///
    /// # Panics
    /// Panics if called more than once.
    pub fn frames(&mut self) -> FrameConsumer {
        self.consumer
            .take()
            .expect("AudioSource::frames() called more than once")
    }

    /// Pure read — does not disturb an active stream.
    pub fn list_devices(&self) -> Vec<DeviceInfo> {
        device::list_input_devices()
    }

    /// Select an input device by index. Stops any active stream first;
    /// on failure to validate, the previous selection is left untouched
    /// (state becomes *stopped*, never a half-open stream).
    pub fn select(&mut self, device_index: usize) -> Result<()> {
        let known = self.list_devices();
        if !known.iter().any(|d| d.index == device_index) {
            return Err(CaptionerError::Device {
                kind: DeviceErrorKind::Unavailable,
                detail: format!("no input device with index {device_index}"),
            });
        }
        self.stop();
        self.selected_device = Some(device_index);
        Ok(())
    }

    /// Start capturing from the selected device (or device 0 if none was
    /// explicitly selected) into the persistent frame channel. Idempotent —
    /// calling `start` while already running is a no-op.
    pub async fn start(&mut self) -> Result<()> {
        if self.capture.is_some() {
            warn!("start() called while already running; ignoring");
            return Ok(());
        }

        let device_index = self.selected_device.unwrap_or(0);
        let frame_size = self.frame_size;
        let producer = self.producer.clone();

        self.running.store(true, Ordering::Release);
        let running = Arc::clone(&self.running);

        let capture = tokio::task::spawn_blocking(move || {
            AudioCapture::open(device_index, frame_size, producer, running)
        })
        .await
        .map_err(|e| CaptionerError::Other(anyhow::anyhow!("capture thread panicked: {e}")))??;

        self.capture = Some(capture);
        Ok(())
    }

    /// Idempotent: stopping an already-stopped source is a no-op.
    pub fn stop(&mut self) {
        if let Some(capture) = self.capture.take() {
            capture.stop();
        }
        self.running.store(false, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.capture.is_some()
    }
}
