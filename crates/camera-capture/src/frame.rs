//! Video frame types and pixel statistics

/// Decoded RGB video frame
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// RGB pixel data (width * height * 3)
    pub data: Vec<u8>,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Capture timestamp (nanoseconds)
    pub timestamp_ns: u64,
    /// Frame sequence number
    pub sequence: u32,
}

/// Mean and spread of a frame's luminance (0-255 scale)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LuminanceStats {
    pub mean: f32,
    pub std_dev: f32,
}

impl VideoFrame {
    /// Create a new video frame from raw RGB data
    pub fn new(data: Vec<u8>, width: u32, height: u32, timestamp_ns: u64, sequence: u32) -> Self {
        Self {
            data,
            width,
            height,
            timestamp_ns,
            sequence,
        }
    }

    /// Create a frame filled with a single RGB color
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let pixels = (width * height) as usize;
        let mut data = Vec::with_capacity(pixels * 3);
        for _ in 0..pixels {
            data.extend_from_slice(&rgb);
        }
        Self::new(data, width, height, 0, 0)
    }

    /// Whether the pixel buffer matches the declared dimensions
    pub fn is_well_formed(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.data.len() == (self.width as usize) * (self.height as usize) * 3
    }

    /// Convert to grayscale
    pub fn to_grayscale(&self) -> Vec<u8> {
        let mut gray = Vec::with_capacity((self.width * self.height) as usize);
        for pixel in self.data.chunks_exact(3) {
            // Luminance formula: 0.299*R + 0.587*G + 0.114*B
            let y = (pixel[0] as f32 * 0.299
                   + pixel[1] as f32 * 0.587
                   + pixel[2] as f32 * 0.114) as u8;
            gray.push(y);
        }
        gray
    }

    /// Mean and population standard deviation of grayscale luminance
    pub fn luminance_stats(&self) -> LuminanceStats {
        let gray = self.to_grayscale();
        if gray.is_empty() {
            return LuminanceStats::default();
        }

        let n = gray.len() as f64;
        let mean = gray.iter().map(|&v| v as f64).sum::<f64>() / n;
        let variance = gray
            .iter()
            .map(|&v| {
                let d = v as f64 - mean;
                d * d
            })
            .sum::<f64>()
            / n;

        LuminanceStats {
            mean: mean as f32,
            std_dev: variance.sqrt() as f32,
        }
    }
}
