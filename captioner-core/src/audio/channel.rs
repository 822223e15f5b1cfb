//! A small bounded, drop-oldest channel of whole `AudioFrame`s.
//!
//! AudioSource hands off discrete, fixed-size frames rather than a
//! continuous byte stream, with an overflow policy of "drop the oldest
//! frame to admit the latest" rather than blocking — realtime audio
//! prefers fresh data over a backlog (§5, Glossary "Drop-oldest").
//! `crossbeam_channel`'s bounded MPMC channel gives us a `try_recv` on the
//! producer side too, which is what lets the producer evict the head
//! itself instead of blocking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use super::AudioFrame;

/// Minimum channel capacity mandated by §5 ("capacity ≥ 8 frames").
pub const MIN_CAPACITY: usize = 8;

/// Producer half: used from the audio capture callback. `Clone` so it can be
/// captured into the cpal stream closure while a copy is retained elsewhere
/// for diagnostics.
#[derive(Clone)]
pub struct FrameProducer {
    tx: Sender<AudioFrame>,
    rx: Receiver<AudioFrame>,
    dropped: Arc<AtomicU64>,
}

impl FrameProducer {
    /// Push a whole frame. Never blocks: if the channel is full, the oldest
    /// queued frame is evicted to make room.
    pub fn push(&self, frame: AudioFrame) {
        match self.tx.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(frame)) => {
                // Evict the oldest frame, then retry once. If a concurrent
                // consumer drained it first, the retry may still fail — that
                // is fine, we only guarantee "drop oldest", not exactness.
                let _ = self.rx.try_recv();
                if self.tx.try_send(frame).is_err() {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    /// Total frames dropped due to overflow since creation.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Consumer half: used from the dispatch thread.
pub struct FrameConsumer {
    rx: Receiver<AudioFrame>,
}

impl FrameConsumer {
    /// Block for up to `timeout` waiting for the next frame (§5: "blocks on
    /// channel receive with a bounded timeout (≤ 100 ms) so it can observe
    /// shutdown").
    pub fn recv_timeout(&self, timeout: Duration) -> Option<AudioFrame> {
        self.rx.recv_timeout(timeout).ok()
    }
}

/// Create a bounded, drop-oldest frame channel of at least `MIN_CAPACITY`.
pub fn create_frame_channel(capacity: usize) -> (FrameProducer, FrameConsumer) {
    let capacity = capacity.max(MIN_CAPACITY);
    let (tx, rx) = bounded(capacity);
    let producer = FrameProducer {
        tx,
        rx: rx.clone(),
        dropped: Arc::new(AtomicU64::new(0)),
    };
    let consumer = FrameConsumer { rx };
    (producer, consumer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioFrame;

    fn frame(tag: i16) -> AudioFrame {
        AudioFrame::new(vec![tag; 4], 16_000)
    }

    #[test]
    fn pushes_are_received_in_order_below_capacity() {
        let (producer, consumer) = create_frame_channel(8);
        producer.push(frame(1));
        producer.push(frame(2));
        let a = consumer.recv_timeout(Duration::from_millis(10)).unwrap();
        let b = consumer.recv_timeout(Duration::from_millis(10)).unwrap();
        assert_eq!(a.samples[0], 1);
        assert_eq!(b.samples[0], 2);
    }

    #[test]
    fn overflow_drops_oldest_not_newest() {
        let (producer, consumer) = create_frame_channel(MIN_CAPACITY);
        for i in 0..(MIN_CAPACITY as i16 + 3) {
            producer.push(frame(i));
        }
        // The newest frame must still be retrievable — oldest ones were evicted.
        let mut last_seen = None;
        while let Some(f) = consumer.recv_timeout(Duration::from_millis(5)) {
            last_seen = Some(f.samples[0]);
        }
        assert_eq!(last_seen, Some(MIN_CAPACITY as i16 + 2));
    }

    #[test]
    fn empty_channel_times_out() {
        let (_producer, consumer) = create_frame_channel(8);
        assert!(consumer.recv_timeout(Duration::from_millis(5)).is_none());
    }
}
