use crate::types::{with_pixels, GeoTransform, PixelData, ViewerError, ViewerResult};
use gdal::raster::{Buffer, GdalDataType, GdalType};
use gdal::spatial_ref::SpatialRef;
use gdal::{Dataset, DriverManager};
use ndarray::{Array3, Axis};
use std::path::Path;

/// CRS written into every exported GeoTIFF
pub const EXPORT_EPSG: u32 = 4326;

/// Write `data` as a GeoTIFF with its native data type
///
/// Band planes are written in band-axis order as GDAL bands 1..=n, with CRS
/// EPSG:4326 and the supplied geotransform.
pub fn export_raster<P: AsRef<Path>>(
    data: &PixelData,
    transform: &GeoTransform,
    destination: P,
) -> ViewerResult<()> {
    log::info!("Saving GeoTIFF: {}", destination.as_ref().display());
    let (rows, cols, bands) = data.dim();
    log::debug!("GeoTIFF size: {}x{} with {} bands ({})", cols, rows, bands, data.dtype_name());

    with_pixels!(data, arr => write_bands(arr, transform, destination.as_ref()))
        .map_err(|e| match e {
            ViewerError::Write(_) => e,
            other => ViewerError::Write(other.to_string()),
        })?;

    log::info!("GeoTIFF saved successfully");
    Ok(())
}

fn write_bands<T: GdalType + Copy>(
    data: &Array3<T>,
    transform: &GeoTransform,
    destination: &Path,
) -> ViewerResult<()> {
    let (height, width, bands) = data.dim();
    if height == 0 || width == 0 || bands == 0 {
        return Err(ViewerError::Write(format!(
            "cannot write an empty raster ({}x{}x{})",
            height, width, bands
        )));
    }

    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let mut dataset = driver.create_with_band_type::<T, _>(
        destination,
        width as isize,
        height as isize,
        bands as isize,
    )?;

    dataset.set_geo_transform(&transform.to_gdal())?;
    dataset.set_spatial_ref(&SpatialRef::from_epsg(EXPORT_EPSG)?)?;

    for (index, plane) in data.axis_iter(Axis(2)).enumerate() {
        let mut rasterband = dataset.rasterband(index as isize + 1)?;
        let flat_data: Vec<T> = plane.iter().copied().collect();
        let buffer = Buffer::new((width, height), flat_data);
        rasterband.write((0, 0), (width, height), &buffer)?;
    }

    // Dropping the dataset flushes and closes the file
    drop(dataset);
    Ok(())
}

/// Export to a scoped temporary file and return its bytes
///
/// The temporary file is removed before this returns, on success or failure.
pub fn export_geotiff_bytes(data: &PixelData, transform: &GeoTransform) -> ViewerResult<Vec<u8>> {
    let temp_file = tempfile::Builder::new()
        .prefix("s2view-")
        .suffix(".tif")
        .tempfile()
        .map_err(|e| ViewerError::Write(format!("cannot create temporary file: {}", e)))?;

    export_raster(data, transform, temp_file.path())?;

    let bytes = std::fs::read(temp_file.path())
        .map_err(|e| ViewerError::Write(format!("cannot read back {}: {}", temp_file.path().display(), e)))?;
    log::debug!("Exported {} bytes", bytes.len());

    temp_file
        .close()
        .map_err(|e| ViewerError::Write(format!("cannot remove temporary file: {}", e)))?;
    Ok(bytes)
}

/// A GeoTIFF read back from disk
#[derive(Debug, Clone)]
pub struct GeoRaster {
    pub data: PixelData,
    pub geo_transform: GeoTransform,
    pub epsg: Option<i32>,
}

/// Open a GeoTIFF and read every band into a (rows, cols, bands) array
pub fn read_geotiff<P: AsRef<Path>>(path: P) -> ViewerResult<GeoRaster> {
    let dataset = Dataset::open(path.as_ref())?;
    let geo_transform = GeoTransform::from_gdal(dataset.geo_transform()?);
    let epsg = dataset.spatial_ref().ok().and_then(|srs| srs.auth_code().ok());

    let band_type = dataset.rasterband(1)?.band_type();
    let data = match band_type {
        GdalDataType::UInt8 => PixelData::UInt8(read_bands(&dataset)?),
        GdalDataType::UInt16 => PixelData::UInt16(read_bands(&dataset)?),
        GdalDataType::Int16 => PixelData::Int16(read_bands(&dataset)?),
        GdalDataType::UInt32 => PixelData::UInt32(read_bands(&dataset)?),
        GdalDataType::Int32 => PixelData::Int32(read_bands(&dataset)?),
        GdalDataType::Float32 => PixelData::Float32(read_bands(&dataset)?),
        GdalDataType::Float64 => PixelData::Float64(read_bands(&dataset)?),
        other => {
            return Err(ViewerError::unreadable(
                &path.as_ref().display().to_string(),
                format!("unsupported pixel type {:?}", other),
            ))
        }
    };

    Ok(GeoRaster {
        data,
        geo_transform,
        epsg,
    })
}

fn read_bands<T: GdalType + Copy + Default>(dataset: &Dataset) -> ViewerResult<Array3<T>> {
    let (width, height) = dataset.raster_size();
    let bands = dataset.raster_count() as usize;
    let mut out = Array3::from_elem((height, width, bands), T::default());

    for index in 0..bands {
        let rasterband = dataset.rasterband(index as isize + 1)?;
        let buffer = rasterband.read_as::<T>((0, 0), (width, height), (width, height), None)?;
        let plane = ndarray::ArrayView2::from_shape((height, width), buffer.data.as_slice())
            .map_err(|e| ViewerError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())))?;
        out.index_axis_mut(Axis(2), index).assign(&plane);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn transform() -> GeoTransform {
        GeoTransform::from_gdal([2.2745, 0.00015625, 0.0, 48.8784, 0.0, -0.00015625])
    }

    #[test]
    fn test_export_empty_raster_fails() {
        let dir = tempfile::tempdir().unwrap();
        let data = PixelData::UInt16(Array3::zeros((0, 4, 1)));
        let result = export_raster(&data, &transform(), dir.path().join("empty.tif"));
        assert!(matches!(result, Err(ViewerError::Write(_))));
    }

    #[test]
    fn test_export_to_missing_directory_fails() {
        let data = PixelData::UInt8(Array3::zeros((4, 4, 1)));
        let result = export_raster(&data, &transform(), "/nonexistent/dir/out.tif");
        assert!(matches!(result, Err(ViewerError::Write(_))));
    }

    #[test]
    fn test_export_bytes_is_a_tiff() {
        let data = PixelData::Int16(Array3::from_shape_fn((8, 6, 2), |(r, c, b)| {
            (r * 100 + c * 10 + b) as i16 - 50
        }));
        let bytes = export_geotiff_bytes(&data, &transform()).unwrap();

        assert!(bytes.len() > 8 * 6 * 2 * 2);
        assert!(bytes.starts_with(b"II*\0") || bytes.starts_with(b"MM\0*"));
    }
}
