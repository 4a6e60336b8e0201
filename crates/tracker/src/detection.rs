//! Detection and selection types

use serde::{Deserialize, Serialize};

/// Axis-aligned box in pixel space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Pixel centre
    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    /// Same box with every corner clamped inside the frame
    pub fn clamped(&self, frame: FrameSize) -> Self {
        let w = frame.width as f32;
        let h = frame.height as f32;
        Self {
            x1: self.x1.clamp(0.0, w),
            y1: self.y1.clamp(0.0, h),
            x2: self.x2.clamp(0.0, w),
            y2: self.y2.clamp(0.0, h),
        }
    }

    pub fn is_finite(&self) -> bool {
        self.x1.is_finite() && self.y1.is_finite() && self.x2.is_finite() && self.y2.is_finite()
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }
}

/// One object reported by the detector
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub class_id: u32,
}

impl Detection {
    pub fn new(bbox: BoundingBox, confidence: f32, class_id: u32) -> Self {
        Self {
            bbox,
            confidence,
            class_id,
        }
    }
}

/// Frame dimensions in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Convert a pixel position to [0, 1] frame coordinates
    pub fn normalize(&self, x: f32, y: f32) -> NormalizedPoint {
        NormalizedPoint {
            x: x / self.width as f32,
            y: y / self.height as f32,
        }
    }
}

/// Position in normalized frame coordinates (0..1 on both axes)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPoint {
    pub x: f32,
    pub y: f32,
}

impl NormalizedPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &NormalizedPoint) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Whether a selection is the subject itself or a substitute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetKind {
    Primary,
    Fallback,
}

/// Winning candidate of a selection pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetSelection {
    /// Detection with its box clamped to the frame
    pub detection: Detection,
    pub score: f32,
    pub center: NormalizedPoint,
    pub kind: TargetKind,
}

impl TargetSelection {
    pub fn is_primary(&self) -> bool {
        self.kind == TargetKind::Primary
    }

    /// Pixel centre of the chosen box
    pub fn pixel_center(&self) -> (f32, f32) {
        self.detection.bbox.center()
    }
}
