// Input-side conversion — stretch, planarize, normalize.

use image::imageops::{self, FilterType};
use image::RgbaImage;

use super::raster::RasterImage;
use super::Tensor;
use crate::error::{PipelineError, Result};

/// Convert a decoded raster into the layout the network expects: shape
/// `[1, 3, size, size]`, channel-major (planar), f32.
///
/// The stretch to `size×size` deliberately ignores the source aspect ratio;
/// the network was trained on directly resized squares.
pub fn preprocess(image: &RasterImage, size: u32, mean: [f32; 3], std: [f32; 3]) -> Result<Tensor> {
    let rgba = RgbaImage::from_raw(image.width, image.height, image.pixels.clone())
        .ok_or_else(|| PipelineError::Decode("raster buffer length mismatch".into()))?;

    let resized = imageops::resize(&rgba, size, size, FilterType::Triangle);

    let plane = (size * size) as usize;
    let mut data = vec![0f32; 3 * plane];

    for (i, pixel) in resized.pixels().enumerate() {
        for c in 0..3 {
            let raw = pixel.0[c] as f32 / 255.0;
            data[c * plane + i] = (raw - mean[c]) / std[c];
        }
    }

    Ok(Tensor::new(
        vec![1, 3, size as usize, size as usize],
        data,
    ))
}
