//! Target selection
//!
//! Scores each allowed detection by confidence and by how close it sits to
//! the frame centre, then keeps the single best one. Substitute (fallback)
//! classes are only accepted near where the primary subject was last seen.

use crate::config::TrackerConfig;
use crate::detection::{Detection, FrameSize, NormalizedPoint, TargetKind, TargetSelection};
use tracing::trace;

/// Picks the best candidate from one frame's detections
#[derive(Debug, Clone)]
pub struct TargetSelector {
    primary_class: u32,
    confidence_weight: f32,
    distance_weight: f32,
    max_fallback_distance: f32,
}

impl TargetSelector {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            primary_class: config.primary_class,
            confidence_weight: config.confidence_weight,
            distance_weight: config.distance_weight,
            max_fallback_distance: config.max_fallback_distance,
        }
    }

    /// Best detection whose class is in `allowed`.
    ///
    /// With `last_primary` set, non-primary candidates farther than the
    /// fallback radius from it are discarded. Ties keep the first candidate.
    pub fn select(
        &self,
        detections: &[Detection],
        frame: FrameSize,
        allowed: &[u32],
        last_primary: Option<NormalizedPoint>,
    ) -> Option<TargetSelection> {
        if frame.is_empty() {
            return None;
        }

        let mut best: Option<TargetSelection> = None;

        for detection in detections {
            if !allowed.contains(&detection.class_id) {
                continue;
            }
            if !detection.bbox.is_finite() || !detection.confidence.is_finite() {
                trace!("Skipping non-finite detection {:?}", detection);
                continue;
            }

            let bbox = detection.bbox.clamped(frame);
            let (px, py) = bbox.center();
            let center = frame.normalize(px, py);

            let kind = if detection.class_id == self.primary_class {
                TargetKind::Primary
            } else {
                TargetKind::Fallback
            };

            if kind == TargetKind::Fallback {
                if let Some(anchor) = last_primary {
                    if center.distance_to(&anchor) > self.max_fallback_distance {
                        continue;
                    }
                }
            }

            let confidence = detection.confidence.clamp(0.0, 1.0);
            let score = self.score(confidence, px, py, frame);

            if best.map_or(true, |b| score > b.score) {
                best = Some(TargetSelection {
                    detection: Detection::new(bbox, confidence, detection.class_id),
                    score,
                    center,
                    kind,
                });
            }
        }

        best
    }

    /// `confidence * w_c + (1 - centre distance factor) * w_d`
    pub fn score(&self, confidence: f32, x: f32, y: f32, frame: FrameSize) -> f32 {
        let half_w = frame.width as f32 / 2.0;
        let half_h = frame.height as f32 / 2.0;
        let dist_x = (x - half_w).abs() / half_w;
        let dist_y = (y - half_h).abs() / half_h;
        let dist_factor = (dist_x + dist_y) / 2.0;

        confidence * self.confidence_weight + (1.0 - dist_factor) * self.distance_weight
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::BoundingBox;
    use proptest::prelude::*;

    const FRAME: FrameSize = FrameSize {
        width: 1280,
        height: 720,
    };

    fn selector() -> TargetSelector {
        TargetSelector::new(&TrackerConfig::default())
    }

    fn det(cx: f32, cy: f32, confidence: f32, class_id: u32) -> Detection {
        Detection::new(
            BoundingBox::new(cx - 40.0, cy - 40.0, cx + 40.0, cy + 40.0),
            confidence,
            class_id,
        )
    }

    #[test]
    fn test_empty_and_zero_frame() {
        assert!(selector().select(&[], FRAME, &[1], None).is_none());
        let dets = [det(640.0, 360.0, 0.9, 1)];
        assert!(selector()
            .select(&dets, FrameSize::new(0, 0), &[1], None)
            .is_none());
    }

    #[test]
    fn test_class_filter() {
        let dets = [det(640.0, 360.0, 0.95, 0), det(100.0, 100.0, 0.5, 1)];
        let chosen = selector().select(&dets, FRAME, &[1], None).unwrap();
        assert_eq!(chosen.detection.class_id, 1);
        assert!(chosen.is_primary());
    }

    #[test]
    fn test_higher_score_wins() {
        // Same confidence, the centred one scores higher
        let dets = [det(100.0, 100.0, 0.8, 1), det(650.0, 350.0, 0.8, 1)];
        let chosen = selector().select(&dets, FRAME, &[1], None).unwrap();
        assert_eq!(chosen.pixel_center(), (650.0, 350.0));
    }

    #[test]
    fn test_ties_keep_first() {
        let dets = [det(540.0, 360.0, 0.8, 1), det(740.0, 360.0, 0.8, 1)];
        let chosen = selector().select(&dets, FRAME, &[1], None).unwrap();
        assert_eq!(chosen.pixel_center(), (540.0, 360.0));
    }

    #[test]
    fn test_score_formula() {
        let s = selector();
        // Centred: distance factor 0
        assert!((s.score(1.0, 640.0, 360.0, FRAME) - 1.0).abs() < 1e-6);
        // Corner: distance factor 1
        assert!((s.score(0.5, 0.0, 0.0, FRAME) - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_fallback_radius() {
        let anchor = Some(NormalizedPoint::new(0.5, 0.5));
        let near = det(700.0, 380.0, 0.6, 0);
        let far = det(100.0, 100.0, 0.99, 2);

        let chosen = selector()
            .select(&[far, near], FRAME, &[0, 2], anchor)
            .unwrap();
        assert_eq!(chosen.detection.class_id, 0);
        assert_eq!(chosen.kind, TargetKind::Fallback);

        assert!(selector().select(&[far], FRAME, &[0, 2], anchor).is_none());
        // Without an anchor there is no radius
        assert!(selector().select(&[far], FRAME, &[0, 2], None).is_some());
    }

    #[test]
    fn test_boxes_are_clamped() {
        let dets = [Detection::new(
            BoundingBox::new(-100.0, 300.0, 100.0, 400.0),
            0.9,
            1,
        )];
        let chosen = selector().select(&dets, FRAME, &[1], None).unwrap();
        assert_eq!(chosen.detection.bbox.x1, 0.0);
        assert_eq!(chosen.pixel_center(), (50.0, 350.0));
    }

    #[test]
    fn test_non_finite_skipped() {
        let dets = [det(640.0, 360.0, f32::NAN, 1)];
        assert!(selector().select(&dets, FRAME, &[1], None).is_none());
    }

    proptest! {
        #[test]
        fn prop_fallback_stays_within_radius(
            ax in 0.0f32..1.0, ay in 0.0f32..1.0,
            points in prop::collection::vec((0.0f32..1280.0, 0.0f32..720.0, 0.0f32..1.0), 1..12),
        ) {
            let anchor = NormalizedPoint::new(ax, ay);
            let dets: Vec<Detection> = points
                .iter()
                .map(|&(x, y, c)| det(x, y, c, 2))
                .collect();
            let config = TrackerConfig::default();
            if let Some(chosen) = selector().select(&dets, FRAME, &config.fallback_classes, Some(anchor)) {
                prop_assert!(chosen.center.distance_to(&anchor) <= config.max_fallback_distance);
            }
        }

        #[test]
        fn prop_returns_max_score(
            points in prop::collection::vec((0.0f32..1280.0, 0.0f32..720.0, 0.0f32..1.0), 1..12),
        ) {
            let dets: Vec<Detection> = points
                .iter()
                .map(|&(x, y, c)| det(x, y, c, 1))
                .collect();
            let chosen = selector().select(&dets, FRAME, &[1], None).unwrap();
            for d in &dets {
                let (x, y) = d.bbox.clamped(FRAME).center();
                prop_assert!(selector().score(d.confidence, x, y, FRAME) <= chosen.score);
            }
        }
    }
}
