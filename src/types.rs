use chrono::{DateTime, NaiveDate, Utc};
use ndarray::Array3;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Geographic bounding box in WGS84 degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl BoundingBox {
    /// Create a bounding box, rejecting degenerate or inverted extents
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> ViewerResult<Self> {
        if ![west, south, east, north].iter().all(|v| v.is_finite()) {
            return Err(ViewerError::InvalidRequest(format!(
                "Bounding box has non-finite coordinates: [{}, {}, {}, {}]",
                west, south, east, north
            )));
        }
        if west >= east || south >= north {
            return Err(ViewerError::InvalidRequest(format!(
                "Bounding box must satisfy west < east and south < north: [{}, {}, {}, {}]",
                west, south, east, north
            )));
        }

        Ok(Self { west, south, east, north })
    }

    /// Square box of `buffer` degrees around a point
    pub fn around(lat: f64, lon: f64, buffer: f64) -> ViewerResult<Self> {
        if !(buffer > 0.0) {
            return Err(ViewerError::InvalidRequest(format!(
                "Buffer must be positive, got {}",
                buffer
            )));
        }
        Self::new(lon - buffer, lat - buffer, lon + buffer, lat + buffer)
    }

    /// `[west, south, east, north]`, the order STAC search expects
    pub fn to_array(&self) -> [f64; 4] {
        [self.west, self.south, self.east, self.north]
    }

    pub fn center(&self) -> (f64, f64) {
        ((self.south + self.north) / 2.0, (self.west + self.east) / 2.0)
    }
}

/// GDAL-style affine geotransform
///
/// `x = top_left_x + col * pixel_width + row * rotation_x`
/// `y = top_left_y + col * rotation_y + row * pixel_height`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self {
            top_left_x: gt[0],
            pixel_width: gt[1],
            rotation_x: gt[2],
            top_left_y: gt[3],
            rotation_y: gt[4],
            pixel_height: gt[5],
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.top_left_x,
            self.pixel_width,
            self.rotation_x,
            self.top_left_y,
            self.rotation_y,
            self.pixel_height,
        ]
    }

    /// Geographic coordinates of the top-left corner of pixel (row, col)
    pub fn pixel_to_geo(&self, row: f64, col: f64) -> (f64, f64) {
        let x = self.top_left_x + col * self.pixel_width + row * self.rotation_x;
        let y = self.top_left_y + col * self.rotation_y + row * self.pixel_height;
        (x, y)
    }

    /// Fractional (row, col) of a geographic coordinate, via the inverse affine
    pub fn geo_to_pixel(&self, x: f64, y: f64) -> ViewerResult<(f64, f64)> {
        let det = self.pixel_width * self.pixel_height - self.rotation_x * self.rotation_y;
        if det == 0.0 || !det.is_finite() {
            return Err(ViewerError::InvalidRequest(format!(
                "Geotransform is not invertible: {:?}",
                self.to_gdal()
            )));
        }

        let dx = x - self.top_left_x;
        let dy = y - self.top_left_y;
        let col = (self.pixel_height * dx - self.rotation_x * dy) / det;
        let row = (self.pixel_width * dy - self.rotation_y * dx) / det;
        Ok((row, col))
    }

    /// Transform of a window of this raster after resampling it to `out_size` (rows, cols)
    pub fn window_transform(&self, window: &PixelWindow, out_size: (usize, usize)) -> Self {
        let (out_rows, out_cols) = out_size;
        let (x0, y0) = self.pixel_to_geo(window.row_off as f64, window.col_off as f64);
        let row_scale = window.height as f64 / out_rows.max(1) as f64;
        let col_scale = window.width as f64 / out_cols.max(1) as f64;

        Self {
            top_left_x: x0,
            pixel_width: self.pixel_width * col_scale,
            rotation_x: self.rotation_x * row_scale,
            top_left_y: y0,
            rotation_y: self.rotation_y * col_scale,
            pixel_height: self.pixel_height * row_scale,
        }
    }
}

/// Source pixel window, in whole pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelWindow {
    pub row_off: usize,
    pub col_off: usize,
    pub height: usize,
    pub width: usize,
}

/// Inclusive date range for catalog search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> ViewerResult<Self> {
        if start > end {
            return Err(ViewerError::InvalidRequest(format!(
                "Start date {} is after end date {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// Both dates or none; a lone start or end date means "no date filter"
    pub fn from_optional(start: Option<NaiveDate>, end: Option<NaiveDate>) -> ViewerResult<Option<Self>> {
        match (start, end) {
            (Some(start), Some(end)) => Self::new(start, end).map(Some),
            _ => Ok(None),
        }
    }

    /// ISO-8601 interval, e.g. `2024-06-01/2024-06-30`
    pub fn to_interval(&self) -> String {
        format!("{}/{}", self.start, self.end)
    }
}

/// One catalog search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneRecord {
    pub id: String,
    pub datetime: DateTime<Utc>,
    pub cloud_cover: Option<f64>,
    /// Band id (e.g. `B04`) to asset href
    pub assets: BTreeMap<String, String>,
}

impl SceneRecord {
    /// Selector label, e.g. `2024-06-12 10:56 | Cloud 3.2%`
    pub fn label(&self) -> String {
        let cloud = match self.cloud_cover {
            Some(cc) => format!("{}", cc),
            None => "NA".to_string(),
        };
        format!("{} | Cloud {}%", self.datetime.format("%Y-%m-%d %H:%M"), cloud)
    }
}

/// Multi-band pixels (rows x cols x bands) in the source's native data type
#[derive(Debug, Clone, PartialEq)]
pub enum PixelData {
    UInt8(Array3<u8>),
    UInt16(Array3<u16>),
    Int16(Array3<i16>),
    UInt32(Array3<u32>),
    Int32(Array3<i32>),
    Float32(Array3<f32>),
    Float64(Array3<f64>),
}

/// Apply the same expression to whichever array a `PixelData` holds
macro_rules! with_pixels {
    ($data:expr, $arr:ident => $body:expr) => {
        match $data {
            $crate::types::PixelData::UInt8($arr) => $body,
            $crate::types::PixelData::UInt16($arr) => $body,
            $crate::types::PixelData::Int16($arr) => $body,
            $crate::types::PixelData::UInt32($arr) => $body,
            $crate::types::PixelData::Int32($arr) => $body,
            $crate::types::PixelData::Float32($arr) => $body,
            $crate::types::PixelData::Float64($arr) => $body,
        }
    };
}
pub(crate) use with_pixels;

impl PixelData {
    /// (rows, cols, bands)
    pub fn dim(&self) -> (usize, usize, usize) {
        with_pixels!(self, arr => arr.dim())
    }

    pub fn band_count(&self) -> usize {
        self.dim().2
    }

    pub fn dtype_name(&self) -> &'static str {
        match self {
            PixelData::UInt8(_) => "uint8",
            PixelData::UInt16(_) => "uint16",
            PixelData::Int16(_) => "int16",
            PixelData::UInt32(_) => "uint32",
            PixelData::Int32(_) => "int32",
            PixelData::Float32(_) => "float32",
            PixelData::Float64(_) => "float64",
        }
    }
}

/// Result of a band extraction
#[derive(Debug, Clone, PartialEq)]
pub struct BandStack {
    pub data: PixelData,
    /// Band ids in the order of the band axis
    pub bands: Vec<String>,
    /// Geotransform of the full reference asset, not of the crop
    pub geo_transform: GeoTransform,
    /// Window read from the reference asset
    pub window: PixelWindow,
}

impl BandStack {
    /// Geotransform describing the resampled crop itself
    pub fn crop_transform(&self) -> GeoTransform {
        let (rows, cols, _) = self.data.dim();
        self.geo_transform.window_transform(&self.window, (rows, cols))
    }
}

/// Error types for scene search, extraction and export
#[derive(Debug, thiserror::Error)]
pub enum ViewerError {
    #[error("No Sentinel-2 images found for this area/dates")]
    NoResults,

    #[error("Band {0} is not available in the selected scene")]
    BandNotFound(String),

    #[error("Asset {href} could not be read: {reason}")]
    AssetUnreadable { href: String, reason: String },

    #[error("Bounding box does not overlap the asset coverage")]
    EmptyWindow,

    #[error("Failed to write raster: {0}")]
    Write(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),
}

impl ViewerError {
    pub(crate) fn unreadable(href: &str, reason: impl std::fmt::Display) -> Self {
        ViewerError::AssetUnreadable {
            href: href.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Result type for viewer operations
pub type ViewerResult<T> = Result<T, ViewerError>;

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn utm_like() -> GeoTransform {
        GeoTransform::from_gdal([399960.0, 10.0, 0.0, 5500020.0, 0.0, -10.0])
    }

    #[test]
    fn test_bbox_rejects_inverted() {
        assert!(BoundingBox::new(2.3, 48.8, 2.2, 48.9).is_err());
        assert!(BoundingBox::new(2.2, 48.9, 2.3, 48.8).is_err());
        assert!(BoundingBox::new(2.2, 48.8, 2.2, 48.9).is_err());
        assert!(BoundingBox::new(f64::NAN, 48.8, 2.3, 48.9).is_err());
    }

    #[test]
    fn test_bbox_around_point() {
        let bbox = BoundingBox::around(48.8584, 2.2945, 0.02).unwrap();
        assert_relative_eq!(bbox.west, 2.2745, epsilon = 1e-12);
        assert_relative_eq!(bbox.south, 48.8384, epsilon = 1e-12);
        assert_relative_eq!(bbox.east, 2.3145, epsilon = 1e-12);
        assert_relative_eq!(bbox.north, 48.8784, epsilon = 1e-12);
        assert!(BoundingBox::around(48.0, 2.0, 0.0).is_err());
    }

    #[test]
    fn test_geo_to_pixel_inverts_pixel_to_geo() {
        let gt = utm_like();
        let (x, y) = gt.pixel_to_geo(120.5, 33.25);
        let (row, col) = gt.geo_to_pixel(x, y).unwrap();
        assert_relative_eq!(row, 120.5, epsilon = 1e-9);
        assert_relative_eq!(col, 33.25, epsilon = 1e-9);
    }

    #[test]
    fn test_geo_to_pixel_rotated() {
        let gt = GeoTransform::from_gdal([100.0, 2.0, 0.5, 200.0, 0.25, -2.0]);
        let (x, y) = gt.pixel_to_geo(7.0, 3.0);
        let (row, col) = gt.geo_to_pixel(x, y).unwrap();
        assert_relative_eq!(row, 7.0, epsilon = 1e-9);
        assert_relative_eq!(col, 3.0, epsilon = 1e-9);
    }

    #[test]
    fn test_singular_transform_is_rejected() {
        let gt = GeoTransform::from_gdal([0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        assert!(gt.geo_to_pixel(1.0, 1.0).is_err());
    }

    #[test]
    fn test_window_transform() {
        let gt = utm_like();
        let window = PixelWindow { row_off: 100, col_off: 50, height: 512, width: 256 };
        let crop = gt.window_transform(&window, (256, 256));

        assert_relative_eq!(crop.top_left_x, 399960.0 + 500.0);
        assert_relative_eq!(crop.top_left_y, 5500020.0 - 1000.0);
        assert_relative_eq!(crop.pixel_width, 10.0);
        assert_relative_eq!(crop.pixel_height, -20.0);
    }

    #[test]
    fn test_date_range() {
        let start = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();

        let range = DateRange::new(start, end).unwrap();
        assert_eq!(range.to_interval(), "2024-06-01/2024-06-30");
        assert!(DateRange::new(end, start).is_err());
        assert_eq!(DateRange::from_optional(Some(start), None).unwrap(), None);
    }

    #[test]
    fn test_scene_label() {
        let mut scene = SceneRecord {
            id: "S2A_MSIL2A_20240612".to_string(),
            datetime: DateTime::parse_from_rfc3339("2024-06-12T10:56:21Z")
                .unwrap()
                .with_timezone(&Utc),
            cloud_cover: Some(3.2),
            assets: BTreeMap::new(),
        };
        assert_eq!(scene.label(), "2024-06-12 10:56 | Cloud 3.2%");

        scene.cloud_cover = None;
        assert_eq!(scene.label(), "2024-06-12 10:56 | Cloud NA%");
    }
}
