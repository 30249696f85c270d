#![allow(dead_code)]

use gdal::raster::{Buffer, GdalType};
use gdal::spatial_ref::SpatialRef;
use gdal::DriverManager;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Geographic grid over western Paris: 0.0005 degree pixels, 400 x 300
pub const GEO_TRANSFORM: [f64; 6] = [2.2, 0.0005, 0.0, 48.95, 0.0, -0.0005];
pub const GEO_SIZE: (usize, usize) = (400, 300);

/// UTM zone 31N grid covering the same area at 10 m
pub const UTM_TRANSFORM: [f64; 6] = [440000.0, 10.0, 0.0, 5420000.0, 0.0, -10.0];
pub const UTM_SIZE: (usize, usize) = (2000, 2000);

/// Band id and the constant offset its synthetic pixels carry
pub const BANDS: [(&str, u16); 4] = [("B02", 1000), ("B03", 2000), ("B04", 3000), ("B08", 4000)];

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Write a single-band GeoTIFF with `value(row, col)` pixels
pub fn write_band<T, F>(
    path: &Path,
    size: (usize, usize),
    transform: [f64; 6],
    epsg: u32,
    value: F,
) where
    T: GdalType + Copy,
    F: Fn(usize, usize) -> T,
{
    let (width, height) = size;
    let driver = DriverManager::get_driver_by_name("GTiff").unwrap();
    let mut dataset = driver
        .create_with_band_type::<T, _>(path, width as isize, height as isize, 1)
        .unwrap();
    dataset.set_geo_transform(&transform).unwrap();
    dataset.set_spatial_ref(&SpatialRef::from_epsg(epsg).unwrap()).unwrap();

    let data: Vec<T> = (0..height)
        .flat_map(|row| (0..width).map(move |col| (row, col)))
        .map(|(row, col)| value(row, col))
        .collect();
    let mut band = dataset.rasterband(1).unwrap();
    band.write((0, 0), (width, height), &Buffer::new((width, height), data))
        .unwrap();
}

/// One GeoTIFF per band in `dir`, returned as a band id to path map
pub fn write_scene(dir: &Path, size: (usize, usize), transform: [f64; 6], epsg: u32) -> BTreeMap<String, String> {
    let mut assets = BTreeMap::new();
    for (band, offset) in BANDS {
        let path: PathBuf = dir.join(format!("{}.tif", band));
        write_band::<u16, _>(&path, size, transform, epsg, |row, col| {
            offset + ((row + col) % 500) as u16
        });
        assets.insert(band.to_string(), path.display().to_string());
    }
    assets
}

pub fn bands(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|b| b.to_string()).collect()
}
