//! Object detector seam
//!
//! The detection backend is external; the runtime only needs boxes,
//! confidences and class ids for the current frame.

use camera_capture::VideoFrame;
use thiserror::Error;
use tracker::Detection;

/// Detector error types
#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Detector unavailable: {0}")]
    Unavailable(String),
}

/// Produces detections for one frame.
///
/// Called on the blocking pool, so a slow backend may simply block.
pub trait ObjectDetector: Send {
    fn detect(&mut self, frame: &VideoFrame) -> Result<Vec<Detection>, DetectorError>;
}

impl<F> ObjectDetector for F
where
    F: FnMut(&VideoFrame) -> Result<Vec<Detection>, DetectorError> + Send,
{
    fn detect(&mut self, frame: &VideoFrame) -> Result<Vec<Detection>, DetectorError> {
        self(frame)
    }
}
