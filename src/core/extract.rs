use crate::config::{Resampling, ViewerConfig};
use crate::core::window::pixel_window;
use crate::io::raster::RasterSource;
use crate::io::signing::AssetSigner;
use crate::types::{
    BandStack, BoundingBox, GeoTransform, PixelData, PixelWindow, ViewerError, ViewerResult,
};
use gdal::raster::{GdalDataType, GdalType};
use ndarray::{Array2, Array3, Axis};
use std::collections::BTreeMap;

/// Band extraction parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtractionParams {
    /// Output (rows, cols) of every band, independent of native resolution
    pub target_size: (usize, usize),
    pub resampling: Resampling,
}

impl Default for ExtractionParams {
    fn default() -> Self {
        Self {
            target_size: (256, 256),
            resampling: Resampling::Nearest,
        }
    }
}

impl From<&ViewerConfig> for ExtractionParams {
    fn from(config: &ViewerConfig) -> Self {
        Self {
            target_size: config.target_shape(),
            resampling: config.resampling,
        }
    }
}

/// Reads a bounding box out of per-band assets into a fixed-size band stack
pub struct BandExtractor<'a> {
    signer: &'a dyn AssetSigner,
    params: ExtractionParams,
}

/// Where the window lives, taken from the reference band
struct ReferenceGrid {
    transform: GeoTransform,
    window: PixelWindow,
    /// (width, height) in pixels
    size: (usize, usize),
    band_type: GdalDataType,
}

impl<'a> BandExtractor<'a> {
    pub fn new(signer: &'a dyn AssetSigner, params: ExtractionParams) -> Self {
        Self { signer, params }
    }

    /// Extract `bands` (in order) for `bbox` from `assets` (band id to href)
    ///
    /// The first requested band is the reference: its geotransform defines the
    /// pixel window for every band and is returned unchanged with the stack.
    pub fn extract(
        &self,
        assets: &BTreeMap<String, String>,
        bbox: &BoundingBox,
        bands: &[String],
    ) -> ViewerResult<BandStack> {
        let hrefs = self.resolve_hrefs(assets, bands)?;
        let (rows, cols) = self.params.target_size;
        if rows == 0 || cols == 0 {
            return Err(ViewerError::InvalidRequest(format!(
                "Target size must be non-zero, got {}x{}",
                rows, cols
            )));
        }

        log::info!("Extracting bands {:?} at {}x{}", bands, rows, cols);
        let start_time = std::time::Instant::now();

        let reference = self.reference_grid(hrefs[0], bbox)?;
        let data = match reference.band_type {
            GdalDataType::UInt8 => PixelData::UInt8(self.read_stack::<u8>(&hrefs, &reference)?),
            GdalDataType::UInt16 => PixelData::UInt16(self.read_stack::<u16>(&hrefs, &reference)?),
            GdalDataType::Int16 => PixelData::Int16(self.read_stack::<i16>(&hrefs, &reference)?),
            GdalDataType::UInt32 => PixelData::UInt32(self.read_stack::<u32>(&hrefs, &reference)?),
            GdalDataType::Int32 => PixelData::Int32(self.read_stack::<i32>(&hrefs, &reference)?),
            GdalDataType::Float32 => PixelData::Float32(self.read_stack::<f32>(&hrefs, &reference)?),
            GdalDataType::Float64 => PixelData::Float64(self.read_stack::<f64>(&hrefs, &reference)?),
            other => {
                return Err(ViewerError::unreadable(
                    hrefs[0],
                    format!("unsupported pixel type {:?}", other),
                ))
            }
        };

        log::info!(
            "Extracted {:?} {} stack in {:?}",
            data.dim(),
            data.dtype_name(),
            start_time.elapsed()
        );

        Ok(BandStack {
            data,
            bands: bands.to_vec(),
            geo_transform: reference.transform,
            window: reference.window,
        })
    }

    /// Look up every band before any I/O so a missing band yields no partial result
    fn resolve_hrefs<'b>(
        &self,
        assets: &'b BTreeMap<String, String>,
        bands: &[String],
    ) -> ViewerResult<Vec<&'b str>> {
        if bands.is_empty() {
            return Err(ViewerError::InvalidRequest("No bands selected".to_string()));
        }

        bands
            .iter()
            .map(|band| {
                assets
                    .get(band)
                    .map(String::as_str)
                    .ok_or_else(|| ViewerError::BandNotFound(band.clone()))
            })
            .collect()
    }

    fn open_signed(&self, href: &str) -> ViewerResult<RasterSource> {
        let signed = self.signer.sign(href).map_err(|e| match e {
            ViewerError::AssetUnreadable { .. } => e,
            other => ViewerError::unreadable(href, other),
        })?;
        RasterSource::open(&signed).map_err(|e| match e {
            ViewerError::AssetUnreadable { reason, .. } => ViewerError::unreadable(href, reason),
            other => other,
        })
    }

    fn reference_grid(&self, href: &str, bbox: &BoundingBox) -> ViewerResult<ReferenceGrid> {
        let source = self.open_signed(href)?;
        let transform = source.geo_transform()?;
        log::debug!("Reference geotransform: {:?}", transform.to_gdal());

        let corners = source.bbox_corners(bbox)?;
        let size = source.size();
        let window = pixel_window(&transform, corners, size)?;

        Ok(ReferenceGrid {
            transform,
            window,
            size,
            band_type: source.band_type()?,
        })
    }

    fn read_band<T: GdalType + Copy>(
        &self,
        href: &str,
        reference: &ReferenceGrid,
    ) -> ViewerResult<Array2<T>> {
        let source = self.open_signed(href)?;
        let band_type = source.band_type()?;
        if band_type != reference.band_type {
            return Err(ViewerError::unreadable(
                href,
                format!(
                    "pixel type {:?} differs from reference band type {:?}",
                    band_type, reference.band_type
                ),
            ));
        }

        // The reference window is only valid on the reference pixel grid
        let transform = source.geo_transform()?;
        if transform != reference.transform || source.size() != reference.size {
            log::debug!(
                "{} grid {:?} {:?} differs from reference {:?} {:?}",
                href,
                transform.to_gdal(),
                source.size(),
                reference.transform.to_gdal(),
                reference.size
            );
            return Err(ViewerError::unreadable(href, "grid differs from reference band"));
        }

        source.read_window::<T>(&reference.window, self.params.target_size, self.params.resampling)
    }

    fn read_stack<T: GdalType + Copy + Send>(
        &self,
        hrefs: &[&str],
        reference: &ReferenceGrid,
    ) -> ViewerResult<Array3<T>> {
        #[cfg(feature = "parallel")]
        let planes: Vec<Array2<T>> = {
            use rayon::prelude::*;
            hrefs
                .par_iter()
                .map(|href| self.read_band::<T>(href, reference))
                .collect::<ViewerResult<_>>()?
        };

        #[cfg(not(feature = "parallel"))]
        let planes: Vec<Array2<T>> = hrefs
            .iter()
            .map(|href| self.read_band::<T>(href, reference))
            .collect::<ViewerResult<_>>()?;

        let views: Vec<_> = planes.iter().map(|plane| plane.view()).collect();
        ndarray::stack(Axis(2), &views)
            .map_err(|e| ViewerError::InvalidRequest(format!("Failed to stack bands: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::signing::PassthroughSigner;

    fn assets() -> BTreeMap<String, String> {
        let mut assets = BTreeMap::new();
        assets.insert("B04".to_string(), "/nonexistent/B04.tif".to_string());
        assets
    }

    fn bbox() -> BoundingBox {
        BoundingBox::new(2.2745, 48.8384, 2.3145, 48.8784).unwrap()
    }

    #[test]
    fn test_missing_band_fails_before_io() {
        let extractor = BandExtractor::new(&PassthroughSigner, ExtractionParams::default());
        let bands = vec!["B04".to_string(), "B11".to_string()];

        let result = extractor.extract(&assets(), &bbox(), &bands);
        assert!(matches!(result, Err(ViewerError::BandNotFound(ref b)) if b == "B11"));
    }

    #[test]
    fn test_empty_band_list_is_rejected() {
        let extractor = BandExtractor::new(&PassthroughSigner, ExtractionParams::default());
        let result = extractor.extract(&assets(), &bbox(), &[]);
        assert!(matches!(result, Err(ViewerError::InvalidRequest(_))));
    }

    #[test]
    fn test_zero_target_size_is_rejected() {
        let params = ExtractionParams { target_size: (0, 256), ..Default::default() };
        let extractor = BandExtractor::new(&PassthroughSigner, params);
        let result = extractor.extract(&assets(), &bbox(), &["B04".to_string()]);
        assert!(matches!(result, Err(ViewerError::InvalidRequest(_))));
    }

    #[test]
    fn test_unreadable_asset() {
        let extractor = BandExtractor::new(&PassthroughSigner, ExtractionParams::default());
        let result = extractor.extract(&assets(), &bbox(), &["B04".to_string()]);
        match result {
            Err(ViewerError::AssetUnreadable { href, .. }) => assert_eq!(href, "/nonexistent/B04.tif"),
            other => panic!("expected AssetUnreadable, got {:?}", other),
        }
    }
}
