//! s2view: Sentinel-2 scene search, band extraction and GeoTIFF export
//!
//! Given a point, a buffer and an optional date range, the viewer searches a
//! public STAC catalog for Sentinel-2 L2A scenes, reads a bounding-box window
//! of the selected bands into a fixed-size stack, stretches it for display and
//! can export the raw stack as a georeferenced GeoTIFF.

pub mod types;
pub mod config;
pub mod io;
pub mod core;

// Re-export main types and functions for easier access
pub use crate::types::{
    BandStack, BoundingBox, DateRange, GeoTransform, PixelData, PixelWindow, SceneRecord,
    ViewerError, ViewerResult,
};
pub use crate::config::{Resampling, ViewerConfig};
pub use crate::io::{AssetSigner, PassthroughSigner, PlanetaryComputerSigner, SceneCatalog, StacCatalog};
pub use crate::core::{normalize, run_preview, BandExtractor, ExtractionParams, Preview, PreviewRequest};

#[cfg(feature = "python")]
mod python {
    use crate::config::{ViewerConfig, EXPORT_FILE_NAME, EXPORT_MIME_TYPE};
    use crate::core::pipeline::{preview_scene, search_scenes, select_scene};
    use crate::io::{PlanetaryComputerSigner, StacCatalog};
    use crate::types::{with_pixels, BoundingBox, DateRange, SceneRecord, ViewerError};
    use chrono::NaiveDate;
    use numpy::IntoPyArray;
    use pyo3::exceptions::{PyLookupError, PyRuntimeError, PyValueError};
    use pyo3::prelude::*;
    use pyo3::types::{PyBytes, PyDict, PyList};

    fn to_py_err(e: ViewerError) -> PyErr {
        match e {
            ViewerError::NoResults => PyLookupError::new_err(e.to_string()),
            ViewerError::BandNotFound(_)
            | ViewerError::EmptyWindow
            | ViewerError::InvalidRequest(_) => PyValueError::new_err(e.to_string()),
            other => PyRuntimeError::new_err(other.to_string()),
        }
    }

    fn parse_date(value: Option<String>) -> PyResult<Option<NaiveDate>> {
        value
            .map(|s| {
                NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                    .map_err(|e| PyValueError::new_err(format!("Invalid date '{}': {}", s, e)))
            })
            .transpose()
    }

    fn request_area(
        lat: f64,
        lon: f64,
        buffer: f64,
        start_date: Option<String>,
        end_date: Option<String>,
    ) -> PyResult<(BoundingBox, Option<DateRange>)> {
        let bbox = BoundingBox::around(lat, lon, buffer).map_err(to_py_err)?;
        let range = DateRange::from_optional(parse_date(start_date)?, parse_date(end_date)?)
            .map_err(to_py_err)?;
        Ok((bbox, range))
    }

    fn scene_dict<'py>(py: Python<'py>, scene: &SceneRecord) -> PyResult<&'py PyDict> {
        let dict = PyDict::new(py);
        dict.set_item("id", &scene.id)?;
        dict.set_item("label", scene.label())?;
        dict.set_item("datetime", scene.datetime.to_rfc3339())?;
        dict.set_item("cloud_cover", scene.cloud_cover)?;
        dict.set_item("assets", scene.assets.clone())?;
        Ok(dict)
    }

    /// Search scenes around a point; returns a list of scene dicts
    #[pyfunction]
    #[pyo3(signature = (lat, lon, buffer, start_date=None, end_date=None))]
    fn search(
        py: Python,
        lat: f64,
        lon: f64,
        buffer: f64,
        start_date: Option<String>,
        end_date: Option<String>,
    ) -> PyResult<PyObject> {
        let (bbox, range) = request_area(lat, lon, buffer, start_date, end_date)?;
        let config = ViewerConfig::default();

        let scenes = py
            .allow_threads(|| {
                let catalog = StacCatalog::new(&config)?;
                search_scenes(&catalog, &config, &bbox, range)
            })
            .map_err(to_py_err)?;

        let list = PyList::empty(py);
        for scene in &scenes {
            list.append(scene_dict(py, scene)?)?;
        }
        Ok(list.into())
    }

    /// Load a band preview of one search result
    ///
    /// Returns a dict with the raw `data`, the normalized `display` composite,
    /// the reference `transform` and, when `geotiff` is set, the GeoTIFF bytes.
    #[pyfunction]
    #[pyo3(signature = (lat, lon, buffer, bands, scene_index=0, start_date=None, end_date=None, geotiff=false))]
    #[allow(clippy::too_many_arguments)]
    fn preview(
        py: Python,
        lat: f64,
        lon: f64,
        buffer: f64,
        bands: Vec<String>,
        scene_index: usize,
        start_date: Option<String>,
        end_date: Option<String>,
        geotiff: bool,
    ) -> PyResult<PyObject> {
        let (bbox, range) = request_area(lat, lon, buffer, start_date, end_date)?;
        let config = ViewerConfig::default();

        let (preview, tiff) = py
            .allow_threads(|| {
                let catalog = StacCatalog::new(&config)?;
                let signer = PlanetaryComputerSigner::new(&config)?;
                let scenes = search_scenes(&catalog, &config, &bbox, range)?;
                let scene = select_scene(&scenes, scene_index)?;
                let preview = preview_scene(&signer, &config, scene, &bbox, &bands)?;
                let tiff = if geotiff { Some(preview.export_geotiff()?) } else { None };
                Ok::<_, ViewerError>((preview, tiff))
            })
            .map_err(to_py_err)?;

        let result = PyDict::new(py);
        result.set_item("scene", scene_dict(py, &preview.scene)?)?;
        result.set_item("bands", preview.stack.bands.clone())?;
        let data: PyObject = with_pixels!(preview.stack.data.clone(), arr => arr.into_pyarray(py).into());
        result.set_item("data", data)?;
        result.set_item("display", preview.display.clone().into_pyarray(py))?;
        result.set_item("transform", preview.transform().to_gdal().to_vec())?;
        match tiff {
            Some(bytes) => {
                result.set_item("geotiff", PyBytes::new(py, &bytes))?;
                result.set_item("file_name", EXPORT_FILE_NAME)?;
                result.set_item("mime", EXPORT_MIME_TYPE)?;
            }
            None => result.set_item("geotiff", py.None())?,
        }

        Ok(result.into())
    }

    /// Python module definition
    #[pymodule]
    fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
        m.add_function(wrap_pyfunction!(search, m)?)?;
        m.add_function(wrap_pyfunction!(preview, m)?)?;
        m.add("REFLECTANCE_SCALE", crate::config::REFLECTANCE_SCALE)?;
        m.add("SELECTABLE_BANDS", crate::config::SELECTABLE_BANDS.to_vec())?;
        Ok(())
    }
}
