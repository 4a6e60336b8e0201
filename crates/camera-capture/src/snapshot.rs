//! Annotated debug snapshots
//!
//! Each snapshot is the current frame with a centre crosshair, the target
//! box with its confidence (if any) and a status bar whose colour encodes
//! the tracker mode. The bar carries the status label and, while tracking,
//! the commanded speed. The directory is capped at `max_files`; the oldest
//! files go first.

use crate::frame::VideoFrame;
use crate::CameraError;
use ab_glyph::{FontRef, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut,
};
use imageproc::rect::Rect;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const STATUS_BAR_HEIGHT: u32 = 40;
const CROSSHAIR_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const BOX_COLOR: Rgb<u8> = Rgb([255, 255, 0]);
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const STATUS_SCALE: f32 = 22.0;
const BOX_LABEL_SCALE: f32 = 16.0;

/// DejaVu Sans Mono, see `assets/DejaVuSansMono.LICENSE`
static OVERLAY_FONT: &[u8] = include_bytes!("../assets/DejaVuSansMono.ttf");

/// Snapshot persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Write snapshots at all
    pub enabled: bool,
    /// Output directory
    pub dir: PathBuf,
    /// Maximum number of snapshot files kept
    pub max_files: usize,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: PathBuf::from("/app/debug"),
            max_files: 1000,
        }
    }
}

/// Status bar colour class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusTone {
    Tracking,
    Searching,
    Idle,
    /// Lost target or other out-of-band events
    Alert,
}

impl StatusTone {
    pub fn color(self) -> Rgb<u8> {
        match self {
            StatusTone::Tracking => Rgb([0, 200, 0]),
            StatusTone::Searching => Rgb([255, 140, 0]),
            StatusTone::Idle => Rgb([50, 50, 50]),
            StatusTone::Alert => Rgb([255, 0, 0]),
        }
    }
}

/// What to draw on top of a frame
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    /// Status bar text, also logged alongside the saved path
    pub label: String,
    pub tone: StatusTone,
    /// Target box as [x1, y1, x2, y2] in pixels
    pub bbox: Option<[f32; 4]>,
    /// Detection confidence, drawn above the box
    pub confidence: Option<f32>,
    /// Commanded [pan, tilt], appended to the status text
    pub velocity: Option<[f32; 2]>,
}

impl Annotation {
    /// Full status bar text
    pub fn status_text(&self) -> String {
        match self.velocity {
            Some([pan, tilt]) => format!("{} SPD: P{:.1}/T{:.1}", self.label, pan, tilt),
            None => self.label.clone(),
        }
    }
}

/// Consumer of debug snapshot requests
pub trait SnapshotSink: Send {
    /// Persist an annotated frame. `Ok(None)` means the sink chose not to write.
    fn save(&mut self, frame: &VideoFrame, annotation: &Annotation) -> Result<Option<PathBuf>, CameraError>;
}

/// Writes annotated JPEG snapshots to a directory
#[derive(Debug)]
pub struct SnapshotWriter {
    config: SnapshotConfig,
    sequence: u64,
}

impl SnapshotWriter {
    /// Create a writer, creating the output directory if needed
    pub fn new(config: SnapshotConfig) -> Result<Self, CameraError> {
        if config.enabled {
            fs::create_dir_all(&config.dir)
                .map_err(|e| CameraError::SnapshotDir(format!("{}: {}", config.dir.display(), e)))?;
            info!("Debug snapshots enabled in {}", config.dir.display());
        }
        Ok(Self { config, sequence: 0 })
    }

    fn render(frame: &VideoFrame, annotation: &Annotation) -> Result<RgbImage, CameraError> {
        if !frame.is_well_formed() {
            return Err(CameraError::InvalidFrame(format!(
                "{}x{} frame with {} bytes",
                frame.width,
                frame.height,
                frame.data.len()
            )));
        }
        let mut img = RgbImage::from_raw(frame.width, frame.height, frame.data.clone())
            .ok_or_else(|| CameraError::InvalidFrame("Failed to create image buffer".into()))?;
        let font = FontRef::try_from_slice(OVERLAY_FONT).map_err(|e| CameraError::Font(e.to_string()))?;

        let (w, h) = (frame.width as f32, frame.height as f32);
        let (cx, cy) = (w / 2.0, h / 2.0);
        draw_line_segment_mut(&mut img, (cx, 0.0), (cx, h - 1.0), CROSSHAIR_COLOR);
        draw_line_segment_mut(&mut img, (0.0, cy), (w - 1.0, cy), CROSSHAIR_COLOR);

        if let Some([x1, y1, x2, y2]) = annotation.bbox {
            let x = x1.max(0.0) as i32;
            let y = y1.max(0.0) as i32;
            let bw = (x2 - x1).max(0.0) as u32;
            let bh = (y2 - y1).max(0.0) as u32;
            // Two nested outlines for a 2px border
            if bw > 2 && bh > 2 {
                draw_hollow_rect_mut(&mut img, Rect::at(x, y).of_size(bw, bh), BOX_COLOR);
                draw_hollow_rect_mut(&mut img, Rect::at(x + 1, y + 1).of_size(bw - 2, bh - 2), BOX_COLOR);
            }
            if let Some(confidence) = annotation.confidence {
                // Above the box, but never inside the status bar
                let label_y = (y - BOX_LABEL_SCALE as i32 - 2).max(STATUS_BAR_HEIGHT as i32);
                draw_text_mut(
                    &mut img,
                    BOX_COLOR,
                    x,
                    label_y,
                    PxScale::from(BOX_LABEL_SCALE),
                    &font,
                    &format!("{:.2}", confidence),
                );
            }
        }

        let bar_height = STATUS_BAR_HEIGHT.min(frame.height);
        draw_filled_rect_mut(
            &mut img,
            Rect::at(0, 0).of_size(frame.width, bar_height),
            annotation.tone.color(),
        );
        draw_text_mut(
            &mut img,
            TEXT_COLOR,
            10,
            9,
            PxScale::from(STATUS_SCALE),
            &font,
            &annotation.status_text(),
        );

        Ok(img)
    }

    fn next_path(&mut self) -> PathBuf {
        self.sequence += 1;
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S_%3f");
        self.config.dir.join(format!("{}_{:06}.jpg", stamp, self.sequence))
    }

    /// Delete the oldest snapshots beyond the retention limit
    fn prune(&self) -> Result<usize, CameraError> {
        let mut files = list_snapshots(&self.config.dir)?;
        if files.len() <= self.config.max_files {
            return Ok(0);
        }
        files.sort();
        let excess = files.len() - self.config.max_files;
        let mut removed = 0;
        for path in files.into_iter().take(excess) {
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => warn!("Failed to remove old snapshot {}: {}", path.display(), e),
            }
        }
        debug!("Pruned {} old snapshots", removed);
        Ok(removed)
    }
}

impl SnapshotSink for SnapshotWriter {
    fn save(&mut self, frame: &VideoFrame, annotation: &Annotation) -> Result<Option<PathBuf>, CameraError> {
        if !self.config.enabled {
            return Ok(None);
        }

        let img = Self::render(frame, annotation)?;
        let path = self.next_path();
        img.save(&path).map_err(|e| CameraError::Encode(e.to_string()))?;
        info!("Snapshot saved: {} ({})", annotation.status_text(), path.display());

        self.prune()?;
        Ok(Some(path))
    }
}

fn list_snapshots(dir: &Path) -> Result<Vec<PathBuf>, CameraError> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) == Some("jpg") {
            files.push(path);
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annotation(tone: StatusTone) -> Annotation {
        Annotation {
            label: "[TRACKING]".to_string(),
            tone,
            bbox: Some([10.0, 50.0, 30.0, 70.0]),
            confidence: None,
            velocity: None,
        }
    }

    fn bar_pixels(img: &RgbImage) -> Vec<Rgb<u8>> {
        let mut pixels = Vec::new();
        for y in 0..STATUS_BAR_HEIGHT.min(img.height()) {
            for x in 0..img.width() {
                pixels.push(*img.get_pixel(x, y));
            }
        }
        pixels
    }

    fn writer(dir: &Path, max_files: usize) -> SnapshotWriter {
        SnapshotWriter::new(SnapshotConfig {
            enabled: true,
            dir: dir.to_path_buf(),
            max_files,
        })
        .unwrap()
    }

    #[test]
    fn test_render_draws_status_bar_and_box() {
        let frame = VideoFrame::solid(64, 96, [0, 0, 0]);
        let img = SnapshotWriter::render(&frame, &annotation(StatusTone::Searching)).unwrap();

        assert_eq!(*img.get_pixel(5, 5), StatusTone::Searching.color());
        assert_eq!(*img.get_pixel(10, 60), BOX_COLOR);
        assert_eq!(*img.get_pixel(5, 90), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_status_text_carries_label_and_speed() {
        let frame = VideoFrame::solid(320, 96, [0, 0, 0]);
        let idle = Annotation {
            label: "[IDLE] Waiting".to_string(),
            bbox: None,
            ..annotation(StatusTone::Idle)
        };
        let searching = Annotation {
            label: "[SEARCHING] Preset 2".to_string(),
            ..idle.clone()
        };

        let a = SnapshotWriter::render(&frame, &idle).unwrap();
        let b = SnapshotWriter::render(&frame, &searching).unwrap();
        assert!(bar_pixels(&a).iter().any(|p| *p != StatusTone::Idle.color()));
        assert_ne!(bar_pixels(&a), bar_pixels(&b));

        let moving = Annotation {
            velocity: Some([-0.8, 0.2]),
            ..idle.clone()
        };
        assert_eq!(moving.status_text(), "[IDLE] Waiting SPD: P-0.8/T0.2");
        let c = SnapshotWriter::render(&frame, &moving).unwrap();
        assert_ne!(bar_pixels(&a), bar_pixels(&c));
    }

    #[test]
    fn test_confidence_drawn_next_to_box() {
        let frame = VideoFrame::solid(320, 240, [0, 0, 0]);
        let plain = Annotation {
            bbox: Some([100.0, 100.0, 160.0, 150.0]),
            ..annotation(StatusTone::Tracking)
        };
        let scored = Annotation {
            confidence: Some(0.87),
            ..plain.clone()
        };

        let a = SnapshotWriter::render(&frame, &plain).unwrap();
        let b = SnapshotWriter::render(&frame, &scored).unwrap();
        // Label band between the status bar and the box top
        let band = |img: &RgbImage| {
            (STATUS_BAR_HEIGHT..100)
                .flat_map(|y| (100..160).map(move |x| (x, y)))
                .filter(|&(x, y)| *img.get_pixel(x, y) != Rgb([0, 0, 0]))
                .count()
        };
        assert_eq!(band(&a), 0);
        assert!(band(&b) > 0);
    }

    #[test]
    fn test_render_rejects_malformed_frame() {
        let frame = VideoFrame::new(vec![0; 10], 64, 64, 0, 0);
        assert!(SnapshotWriter::render(&frame, &annotation(StatusTone::Idle)).is_err());
    }

    #[test]
    fn test_save_writes_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = writer(dir.path(), 10);
        let frame = VideoFrame::solid(64, 64, [90, 90, 90]);

        let path = writer.save(&frame, &annotation(StatusTone::Tracking)).unwrap().unwrap();
        assert!(path.exists());
        assert_eq!(path.extension().unwrap(), "jpg");
    }

    #[test]
    fn test_retention_keeps_newest() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = writer(dir.path(), 2);
        let frame = VideoFrame::solid(32, 48, [90, 90, 90]);

        let mut written = Vec::new();
        for _ in 0..4 {
            written.push(writer.save(&frame, &annotation(StatusTone::Idle)).unwrap().unwrap());
        }

        let remaining = list_snapshots(dir.path()).unwrap();
        assert_eq!(remaining.len(), 2);
        assert!(remaining.contains(&written[3]));
        assert!(!written[0].exists());
    }

    #[test]
    fn test_disabled_writer_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = SnapshotWriter::new(SnapshotConfig {
            enabled: false,
            dir: dir.path().join("never-created"),
            max_files: 5,
        })
        .unwrap();
        let frame = VideoFrame::solid(32, 32, [0, 0, 0]);

        assert!(writer.save(&frame, &annotation(StatusTone::Alert)).unwrap().is_none());
        assert!(!dir.path().join("never-created").exists());
    }
}
