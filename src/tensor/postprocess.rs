// Output-side reconstruction — scale activations, restore the original resolution.

use image::imageops::{self, FilterType};
use image::RgbaImage;
use tracing::info;

use super::raster::Mask;
use super::Tensor;
use crate::error::{PipelineError, Result};

/// Interpret `output` as a single-channel `size×size` activation map and
/// build an opaque grayscale mask resampled to `target_width × target_height`.
///
/// Activations are scaled directly as `clamp(round(v * 255), 0, 255)`, with
/// no sigmoid and no renormalization; that is the asset's documented output
/// convention. The observed raw range is recorded on the mask and logged.
pub fn postprocess(
    output: &Tensor,
    target_width: u32,
    target_height: u32,
    size: u32,
) -> Result<Mask> {
    let plane = (size * size) as usize;
    if !is_single_channel_plane(&output.shape, size) || output.data.len() != plane {
        return Err(PipelineError::OutputShape(output.shape.clone()));
    }

    let mut raw_min = f32::INFINITY;
    let mut raw_max = f32::NEG_INFINITY;
    let mut pixels = vec![0u8; 4 * plane];

    for (i, &v) in output.data.iter().enumerate() {
        if v < raw_min {
            raw_min = v;
        }
        if v > raw_max {
            raw_max = v;
        }

        let intensity = (v * 255.0).round().clamp(0.0, 255.0) as u8;
        let o = i * 4;
        pixels[o] = intensity;
        pixels[o + 1] = intensity;
        pixels[o + 2] = intensity;
        pixels[o + 3] = 255;
    }

    info!("mask activation range min={} max={}", raw_min, raw_max);

    let square = RgbaImage::from_raw(size, size, pixels)
        .ok_or_else(|| PipelineError::OutputShape(output.shape.clone()))?;
    let scaled = imageops::resize(&square, target_width, target_height, FilterType::Lanczos3);

    Ok(Mask {
        width: target_width,
        height: target_height,
        pixels: scaled.into_raw(),
        raw_min,
        raw_max,
    })
}

/// Accept `[1, 1, S, S]`, `[1, S, S]`, `[S, S]`, or flat `[S*S]` layouts.
fn is_single_channel_plane(shape: &[usize], size: u32) -> bool {
    let s = size as usize;
    match shape {
        [n] => *n == s * s,
        [h, w] => *h == s && *w == s,
        [1, h, w] => *h == s && *w == s,
        [1, 1, h, w] => *h == s && *w == s,
        _ => false,
    }
}
