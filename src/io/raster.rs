use crate::config::Resampling;
use crate::types::{BoundingBox, GeoTransform, PixelWindow, ViewerError, ViewerResult};
use gdal::raster::{GdalDataType, GdalType, ResampleAlg};
use gdal::spatial_ref::{CoordTransform, SpatialRef};
use gdal::Dataset;
use ndarray::Array2;

/// Prefix HTTP(S) references with GDAL's streaming `/vsicurl/` handler
pub fn gdal_path(reference: &str) -> String {
    if reference.starts_with("http://") || reference.starts_with("https://") {
        format!("/vsicurl/{}", reference)
    } else {
        reference.to_string()
    }
}

/// Single-band raster asset opened with GDAL
///
/// The dataset handle is released when the source is dropped.
pub struct RasterSource {
    dataset: Dataset,
    href: String,
}

impl RasterSource {
    /// Open an already-signed reference
    pub fn open(reference: &str) -> ViewerResult<Self> {
        let path = gdal_path(reference);
        log::debug!("Opening raster: {}", path);

        let dataset = Dataset::open(&path).map_err(|e| ViewerError::unreadable(reference, e))?;
        if dataset.raster_count() < 1 {
            return Err(ViewerError::unreadable(reference, "dataset has no raster bands"));
        }

        Ok(Self {
            dataset,
            href: reference.to_string(),
        })
    }

    pub fn href(&self) -> &str {
        &self.href
    }

    /// (width, height) in pixels
    pub fn size(&self) -> (usize, usize) {
        self.dataset.raster_size()
    }

    pub fn geo_transform(&self) -> ViewerResult<GeoTransform> {
        let gt = self
            .dataset
            .geo_transform()
            .map_err(|e| ViewerError::unreadable(&self.href, format!("no geotransform: {}", e)))?;
        Ok(GeoTransform::from_gdal(gt))
    }

    pub fn band_type(&self) -> ViewerResult<GdalDataType> {
        let band = self
            .dataset
            .rasterband(1)
            .map_err(|e| ViewerError::unreadable(&self.href, e))?;
        Ok(band.band_type())
    }

    /// Bounding box corners expressed in the raster's own CRS
    ///
    /// Returns `[(west, north), (east, south)]`. Rasters without a CRS are
    /// assumed to already be in WGS84 longitude/latitude.
    pub fn bbox_corners(&self, bbox: &BoundingBox) -> ViewerResult<[(f64, f64); 2]> {
        let corners = [(bbox.west, bbox.north), (bbox.east, bbox.south)];

        let target = match self.dataset.spatial_ref() {
            Ok(srs) => srs,
            Err(_) => {
                log::warn!("{} has no CRS, treating it as WGS84", self.href);
                return Ok(corners);
            }
        };
        if matches!(target.auth_code(), Ok(4326)) {
            return Ok(corners);
        }

        let wgs84 = SpatialRef::from_epsg(4326)?;
        wgs84.set_axis_mapping_strategy(gdal_sys::OSRAxisMappingStrategy::OAMS_TRADITIONAL_GIS_ORDER);
        target.set_axis_mapping_strategy(gdal_sys::OSRAxisMappingStrategy::OAMS_TRADITIONAL_GIS_ORDER);

        let transform = CoordTransform::new(&wgs84, &target)?;
        let mut xs = [corners[0].0, corners[1].0];
        let mut ys = [corners[0].1, corners[1].1];
        let mut zs = [0.0, 0.0];
        transform
            .transform_coords(&mut xs, &mut ys, &mut zs)
            .map_err(|e| ViewerError::unreadable(&self.href, format!("cannot project bounding box: {}", e)))?;

        log::debug!("Projected corners: ({}, {}) ({}, {})", xs[0], ys[0], xs[1], ys[1]);
        Ok([(xs[0], ys[0]), (xs[1], ys[1])])
    }

    /// Read `window` of band 1, resampled to `out_size` (rows, cols)
    pub fn read_window<T: GdalType + Copy>(
        &self,
        window: &PixelWindow,
        out_size: (usize, usize),
        resampling: Resampling,
    ) -> ViewerResult<Array2<T>> {
        let (out_rows, out_cols) = out_size;
        let band = self
            .dataset
            .rasterband(1)
            .map_err(|e| ViewerError::unreadable(&self.href, e))?;

        let buffer = band
            .read_as::<T>(
                (window.col_off as isize, window.row_off as isize),
                (window.width, window.height),
                (out_cols, out_rows),
                Some(resample_alg(resampling)),
            )
            .map_err(|e| ViewerError::unreadable(&self.href, format!("windowed read failed: {}", e)))?;

        Array2::from_shape_vec((out_rows, out_cols), buffer.data)
            .map_err(|e| ViewerError::unreadable(&self.href, format!("unexpected buffer size: {}", e)))
    }
}

fn resample_alg(resampling: Resampling) -> ResampleAlg {
    match resampling {
        Resampling::Nearest => ResampleAlg::NearestNeighbour,
        Resampling::Bilinear => ResampleAlg::Bilinear,
        Resampling::Cubic => ResampleAlg::Cubic,
        Resampling::Average => ResampleAlg::Average,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gdal_path() {
        assert_eq!(gdal_path("https://host/B04.tif?sig=1"), "/vsicurl/https://host/B04.tif?sig=1");
        assert_eq!(gdal_path("/data/B04.tif"), "/data/B04.tif");
    }

    #[test]
    fn test_open_missing_file() {
        let result = RasterSource::open("nonexistent_band.tif");
        assert!(matches!(result, Err(ViewerError::AssetUnreadable { .. })));
    }
}
