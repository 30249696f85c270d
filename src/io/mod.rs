//! I/O modules for catalog search, asset signing and raster access

pub mod catalog;
pub mod signing;
pub mod raster;
pub mod geotiff;

pub use catalog::{SceneCatalog, SearchQuery, StacCatalog};
pub use signing::{AssetSigner, PassthroughSigner, PlanetaryComputerSigner};
pub use raster::RasterSource;
pub use geotiff::{export_geotiff_bytes, export_raster, read_geotiff, GeoRaster};
