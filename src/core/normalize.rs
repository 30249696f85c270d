//! Reflectance display stretch
//!
//! Sentinel-2 L2A surface reflectance is stored as integers scaled by 10000;
//! a fixed 0..3000 window covers typical land surfaces. This is a linear
//! clip, not a histogram or percentile stretch.

use crate::config::REFLECTANCE_SCALE;
use crate::types::{with_pixels, PixelData, ViewerError, ViewerResult};
use image::{DynamicImage, GrayImage, RgbImage};
use ndarray::{s, Array, Array3, ArrayView, Axis, Dimension};
use num_traits::ToPrimitive;

/// Clip to [0, `REFLECTANCE_SCALE`] and divide by it; NaN maps to 0
pub fn normalize_array<T, D>(values: ArrayView<'_, T, D>) -> Array<f32, D>
where
    T: ToPrimitive + Copy,
    D: Dimension,
{
    values.mapv(|v| stretch(v.to_f32().unwrap_or(0.0)))
}

fn stretch(value: f32) -> f32 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, REFLECTANCE_SCALE) / REFLECTANCE_SCALE
}

/// Display-ready composite of a band stack
///
/// With three or more bands the first three are normalized as RGB; otherwise
/// only the first band is normalized and the result has a single band.
pub fn normalize(data: &PixelData) -> Array3<f32> {
    let bands = data.band_count();
    let keep = if bands >= 3 { 3 } else { 1.min(bands) };
    with_pixels!(data, arr => normalize_array(arr.slice(s![.., .., ..keep])))
}

/// Quantize a normalized composite to an 8-bit RGB or grayscale image
pub fn to_preview_image(display: &Array3<f32>) -> ViewerResult<DynamicImage> {
    let (rows, cols, bands) = display.dim();
    let to_u8 = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;

    match bands {
        3 => {
            let pixels: Vec<u8> = display.iter().map(|&v| to_u8(v)).collect();
            RgbImage::from_raw(cols as u32, rows as u32, pixels)
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(|| ViewerError::InvalidRequest("RGB buffer size mismatch".to_string()))
        }
        1 => {
            let pixels: Vec<u8> = display.index_axis(Axis(2), 0).iter().map(|&v| to_u8(v)).collect();
            GrayImage::from_raw(cols as u32, rows as u32, pixels)
                .map(DynamicImage::ImageLuma8)
                .ok_or_else(|| ViewerError::InvalidRequest("Gray buffer size mismatch".to_string()))
        }
        n => Err(ViewerError::InvalidRequest(format!(
            "Preview needs 1 or 3 bands, got {}",
            n
        ))),
    }
}
