use crate::config::ViewerConfig;
use crate::core::extract::{BandExtractor, ExtractionParams};
use crate::core::normalize::normalize;
use crate::io::catalog::{SceneCatalog, SearchQuery};
use crate::io::geotiff::export_geotiff_bytes;
use crate::io::signing::AssetSigner;
use crate::types::{BandStack, BoundingBox, DateRange, GeoTransform, SceneRecord, ViewerError, ViewerResult};
use ndarray::Array3;

/// Everything one user interaction asks for
#[derive(Debug, Clone)]
pub struct PreviewRequest {
    pub bbox: BoundingBox,
    pub date_range: Option<DateRange>,
    /// Index into the search results
    pub scene_index: usize,
    pub bands: Vec<String>,
}

/// Outcome of a preview request
#[derive(Debug, Clone)]
pub struct Preview {
    pub scene: SceneRecord,
    /// Raw pixels in the source data type
    pub stack: BandStack,
    /// Normalized composite in [0, 1]
    pub display: Array3<f32>,
}

impl Preview {
    /// Full-asset geotransform of the reference band
    pub fn transform(&self) -> GeoTransform {
        self.stack.geo_transform
    }

    /// GeoTIFF of the raw stack, georeferenced to the resampled crop
    pub fn export_geotiff(&self) -> ViewerResult<Vec<u8>> {
        log::info!("Exporting {} bands of {}", self.stack.bands.len(), self.scene.id);
        export_geotiff_bytes(&self.stack.data, &self.stack.crop_transform())
    }
}

/// Search the catalog for the request's area and dates
pub fn search_scenes(
    catalog: &dyn SceneCatalog,
    config: &ViewerConfig,
    bbox: &BoundingBox,
    date_range: Option<DateRange>,
) -> ViewerResult<Vec<SceneRecord>> {
    let query = SearchQuery::new(*bbox, date_range, config);
    let scenes = catalog.search(&query)?;
    if scenes.is_empty() {
        return Err(ViewerError::NoResults);
    }
    Ok(scenes)
}

/// Pick the scene at `index` from a search result
pub fn select_scene(scenes: &[SceneRecord], index: usize) -> ViewerResult<&SceneRecord> {
    scenes.get(index).ok_or_else(|| {
        ViewerError::InvalidRequest(format!(
            "Scene index {} out of range ({} scenes found)",
            index,
            scenes.len()
        ))
    })
}

/// Extract and normalize the requested bands of one scene
pub fn preview_scene(
    signer: &dyn AssetSigner,
    config: &ViewerConfig,
    scene: &SceneRecord,
    bbox: &BoundingBox,
    bands: &[String],
) -> ViewerResult<Preview> {
    log::info!("Loading preview of {} ({})", scene.id, scene.label());

    let extractor = BandExtractor::new(signer, ExtractionParams::from(config));
    let stack = extractor.extract(&scene.assets, bbox, bands)?;
    let display = normalize(&stack.data);

    Ok(Preview {
        scene: scene.clone(),
        stack,
        display,
    })
}

/// Search, select, extract and normalize for one request
pub fn run_preview(
    catalog: &dyn SceneCatalog,
    signer: &dyn AssetSigner,
    config: &ViewerConfig,
    request: &PreviewRequest,
) -> ViewerResult<Preview> {
    let scenes = search_scenes(catalog, config, &request.bbox, request.date_range)?;
    let scene = select_scene(&scenes, request.scene_index)?;
    preview_scene(signer, config, scene, &request.bbox, &request.bands)
}
