use crate::types::{GeoTransform, PixelWindow, ViewerError, ViewerResult};

/// Pixel window covering the area between two diagonal corners
///
/// `corners` are in the raster's CRS. Rows and columns are ordered
/// independently, so either diagonal and either corner order give the same
/// window. The window is expanded outward to whole pixels and clipped to the
/// `raster_size` (width, height) extent.
pub fn pixel_window(
    transform: &GeoTransform,
    corners: [(f64, f64); 2],
    raster_size: (usize, usize),
) -> ViewerResult<PixelWindow> {
    let (row_a, col_a) = transform.geo_to_pixel(corners[0].0, corners[0].1)?;
    let (row_b, col_b) = transform.geo_to_pixel(corners[1].0, corners[1].1)?;

    // f64::min/max ignore NaN operands
    if ![row_a, col_a, row_b, col_b].iter().all(|v| v.is_finite()) {
        return Err(ViewerError::InvalidRequest(format!(
            "Bounding box maps to non-finite pixel indices: ({}, {}) ({}, {})",
            row_a, col_a, row_b, col_b
        )));
    }

    let row_start = row_a.min(row_b).floor();
    let row_stop = row_a.max(row_b).ceil();
    let col_start = col_a.min(col_b).floor();
    let col_stop = col_a.max(col_b).ceil();

    log::debug!(
        "Fractional window rows [{:.3}, {:.3}] cols [{:.3}, {:.3}]",
        row_a.min(row_b),
        row_a.max(row_b),
        col_a.min(col_b),
        col_a.max(col_b)
    );

    let (width, height) = raster_size;
    let row_start = row_start.max(0.0);
    let col_start = col_start.max(0.0);
    let row_stop = row_stop.min(height as f64);
    let col_stop = col_stop.min(width as f64);

    if !(row_stop > row_start && col_stop > col_start) {
        return Err(ViewerError::EmptyWindow);
    }

    let window = PixelWindow {
        row_off: row_start as usize,
        col_off: col_start as usize,
        height: (row_stop - row_start) as usize,
        width: (col_stop - col_start) as usize,
    };
    log::debug!("Pixel window: {:?}", window);
    Ok(window)
}
