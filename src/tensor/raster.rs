// Raster buffer types — the seam between host image codecs and the tensor pipeline.

use std::io::Cursor;

use image::{ImageFormat, RgbaImage};

use crate::error::{PipelineError, Result};

/// Decoded image pixels, interleaved RGBA, `4 * width * height` bytes.
#[derive(Debug, Clone)]
pub struct RasterImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl RasterImage {
    /// Decode an encoded image (PNG, JPEG, …) into interleaved RGBA.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let decoded =
            image::load_from_memory(bytes).map_err(|e| PipelineError::Decode(e.to_string()))?;
        let rgba = decoded.to_rgba8();
        let (width, height) = rgba.dimensions();
        Ok(Self {
            width,
            height,
            pixels: rgba.into_raw(),
        })
    }
}

/// Grayscale-opaque overlay at the original image's resolution.
///
/// Pixels are interleaved RGBA with `R = G = B = intensity`, `A = 255`.
#[derive(Debug, Clone)]
pub struct Mask {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
    /// Observed raw activation range, for calibration and debugging.
    pub raw_min: f32,
    pub raw_max: f32,
}

impl Mask {
    /// Encode the mask as PNG.
    pub fn to_png(&self) -> Result<Vec<u8>> {
        let img = RgbaImage::from_raw(self.width, self.height, self.pixels.clone())
            .ok_or_else(|| PipelineError::Decode("mask buffer length mismatch".into()))?;
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png)
            .map_err(|e| PipelineError::Decode(e.to_string()))?;
        Ok(out.into_inner())
    }
}
