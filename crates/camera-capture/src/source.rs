//! Latest-frame source with pause/resume
//!
//! The decoder side publishes every frame it produces; the tracker only
//! ever reads the newest one. Pausing lets the tracker stop paying for
//! frames while it sleeps or idles.

use crate::frame::VideoFrame;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// A source of the most recent decoded frame
pub trait FrameSource: Send {
    /// Newest frame, if any has arrived
    fn latest(&self) -> Option<VideoFrame>;

    /// Stop accepting new frames and forget the held one
    fn pause(&self);

    /// Accept frames again
    fn resume(&self);

    fn is_paused(&self) -> bool;
}

#[derive(Debug, Default)]
struct Shared {
    slot: Mutex<Option<VideoFrame>>,
    paused: AtomicBool,
    dropped: AtomicU64,
}

/// Single-slot frame buffer shared between a decoder and the tracker.
///
/// Cloning yields another handle to the same slot.
#[derive(Debug, Clone, Default)]
pub struct LatestFrameBuffer {
    shared: Arc<Shared>,
}

impl LatestFrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the held frame. Returns `false` if the buffer is paused and
    /// the frame was discarded.
    pub fn publish(&self, frame: VideoFrame) -> bool {
        if self.shared.paused.load(Ordering::Acquire) {
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        if let Ok(mut slot) = self.shared.slot.lock() {
            *slot = Some(frame);
        }
        true
    }

    /// Frames discarded while paused
    pub fn dropped_frames(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}

impl FrameSource for LatestFrameBuffer {
    fn latest(&self) -> Option<VideoFrame> {
        self.shared.slot.lock().ok().and_then(|slot| slot.clone())
    }

    fn pause(&self) {
        if !self.shared.paused.swap(true, Ordering::AcqRel) {
            // A frame from before the pause must not be served after resume
            if let Ok(mut slot) = self.shared.slot.lock() {
                slot.take();
            }
            debug!("Frame source paused");
        }
    }

    fn resume(&self) {
        if self.shared.paused.swap(false, Ordering::AcqRel) {
            debug!("Frame source resumed");
        }
    }

    fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_frame_wins() {
        let buffer = LatestFrameBuffer::new();
        assert!(buffer.latest().is_none());

        let mut first = VideoFrame::solid(2, 2, [0, 0, 0]);
        first.sequence = 1;
        let mut second = VideoFrame::solid(2, 2, [0, 0, 0]);
        second.sequence = 2;

        buffer.publish(first);
        buffer.publish(second);
        assert_eq!(buffer.latest().unwrap().sequence, 2);
    }

    #[test]
    fn test_paused_buffer_drops_frames() {
        let buffer = LatestFrameBuffer::new();
        let producer = buffer.clone();

        buffer.pause();
        assert!(buffer.is_paused());
        assert!(!producer.publish(VideoFrame::solid(2, 2, [1, 1, 1])));
        assert!(buffer.latest().is_none());
        assert_eq!(buffer.dropped_frames(), 1);

        buffer.resume();
        assert!(producer.publish(VideoFrame::solid(2, 2, [1, 1, 1])));
        assert!(buffer.latest().is_some());
    }

    #[test]
    fn test_pause_discards_held_frame() {
        let buffer = LatestFrameBuffer::new();
        buffer.publish(VideoFrame::solid(2, 2, [9, 9, 9]));

        buffer.pause();
        buffer.resume();
        assert!(buffer.latest().is_none());
    }
}
