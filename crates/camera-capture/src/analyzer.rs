//! Brightness-based frame classification
//!
//! A camera in privacy mode (or with a dead stream) delivers a nearly
//! uniform dark picture. The tracker sleeps on such frames and wakes once
//! the picture is bright again.

use crate::frame::{LuminanceStats, VideoFrame};
use serde::{Deserialize, Serialize};

/// Frame analyzer thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Mean luminance below this is "dark"; at or above it is "normal"
    pub privacy_brightness_threshold: f32,

    /// Luminance standard deviation below this is "uniform"
    pub privacy_std_threshold: f32,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            privacy_brightness_threshold: 30.0,
            privacy_std_threshold: 40.0,
        }
    }
}

/// Classification of a single frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameClass {
    /// Dark and uniform: privacy shutter or blackout
    Privacy,
    /// Bright enough to be a real picture
    Normal,
    /// Dark but textured (e.g. a night scene); neither privacy nor normal
    Dim,
}

impl FrameClass {
    pub fn is_privacy(self) -> bool {
        matches!(self, FrameClass::Privacy)
    }

    pub fn is_normal(self) -> bool {
        matches!(self, FrameClass::Normal)
    }
}

/// Classifies frames from their luminance statistics
#[derive(Debug, Clone, Default)]
pub struct FrameAnalyzer {
    config: AnalyzerConfig,
}

impl FrameAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    /// Classify a frame. Frames without pixels are never privacy frames.
    pub fn classify(&self, frame: &VideoFrame) -> FrameClass {
        if frame.data.len() < 3 {
            return FrameClass::Dim;
        }
        self.classify_stats(frame.luminance_stats())
    }

    /// Classify precomputed statistics
    pub fn classify_stats(&self, stats: LuminanceStats) -> FrameClass {
        let is_dark = stats.mean < self.config.privacy_brightness_threshold;
        let is_uniform = stats.std_dev < self.config.privacy_std_threshold;

        if is_dark && is_uniform {
            FrameClass::Privacy
        } else if !is_dark {
            FrameClass::Normal
        } else {
            FrameClass::Dim
        }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn stats(mean: f32, std_dev: f32) -> LuminanceStats {
        LuminanceStats { mean, std_dev }
    }

    #[test]
    fn test_black_frame_is_privacy() {
        let analyzer = FrameAnalyzer::default();
        let frame = VideoFrame::solid(8, 8, [5, 5, 5]);
        assert_eq!(analyzer.classify(&frame), FrameClass::Privacy);
    }

    #[test]
    fn test_bright_frame_is_normal() {
        let analyzer = FrameAnalyzer::default();
        let frame = VideoFrame::solid(8, 8, [120, 130, 110]);
        assert_eq!(analyzer.classify(&frame), FrameClass::Normal);
    }

    #[test]
    fn test_threshold_boundary_is_normal() {
        let analyzer = FrameAnalyzer::default();
        assert_eq!(analyzer.classify_stats(stats(30.0, 0.0)), FrameClass::Normal);
        assert_eq!(analyzer.classify_stats(stats(29.9, 39.9)), FrameClass::Privacy);
    }

    #[test]
    fn test_dark_textured_frame_is_dim() {
        let analyzer = FrameAnalyzer::default();
        assert_eq!(analyzer.classify_stats(stats(20.0, 55.0)), FrameClass::Dim);
    }

    #[test]
    fn test_empty_frame_is_dim() {
        let analyzer = FrameAnalyzer::default();
        let frame = VideoFrame::new(Vec::new(), 0, 0, 0, 0);
        assert_eq!(analyzer.classify(&frame), FrameClass::Dim);
    }

    proptest! {
        #[test]
        fn prop_privacy_and_normal_are_exclusive(mean in 0.0f32..255.0, std_dev in 0.0f32..128.0) {
            let class = FrameAnalyzer::default().classify_stats(stats(mean, std_dev));
            prop_assert!(!(class.is_privacy() && class.is_normal()));
            prop_assert_eq!(class.is_normal(), mean >= 30.0);
        }
    }
}
