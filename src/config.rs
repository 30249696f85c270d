//! Viewer configuration
//!
//! Defaults target the public Microsoft Planetary Computer Sentinel-2 L2A
//! collection, which needs no credentials.

use crate::types::{ViewerError, ViewerResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Pixel value at which reflectance saturates in the display stretch
pub const REFLECTANCE_SCALE: f32 = 3000.0;

/// File name offered for GeoTIFF downloads
pub const EXPORT_FILE_NAME: &str = "sentinel2_selection.tif";

/// MIME type of the GeoTIFF download
pub const EXPORT_MIME_TYPE: &str = "image/tiff";

/// Bands offered by the band selector
pub const SELECTABLE_BANDS: [&str; 4] = ["B04", "B03", "B02", "B08"];

/// True-colour default selection
pub const DEFAULT_BANDS: [&str; 3] = ["B04", "B03", "B02"];

/// Buffer slider range and default, in degrees
pub const MIN_BUFFER_DEG: f64 = 0.01;
pub const MAX_BUFFER_DEG: f64 = 0.1;
pub const DEFAULT_BUFFER_DEG: f64 = 0.02;

/// Resampling used when a window is read into the fixed output size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resampling {
    #[default]
    Nearest,
    Bilinear,
    Cubic,
    Average,
}

/// Viewer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// STAC API root
    pub catalog_url: String,
    /// STAC collection id
    pub collection: String,
    /// SAS token endpoint used to sign blob storage hrefs
    pub sas_endpoint: String,
    /// Only scenes with `eo:cloud_cover` strictly below this are returned
    pub max_cloud_cover: f64,
    /// Maximum number of scenes per search
    pub max_items: usize,
    /// Output (rows, cols) of every extracted band
    pub target_size: [usize; 2],
    pub resampling: Resampling,
    pub http_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            catalog_url: "https://planetarycomputer.microsoft.com/api/stac/v1".to_string(),
            collection: "sentinel-2-l2a".to_string(),
            sas_endpoint: "https://planetarycomputer.microsoft.com/api/sas/v1".to_string(),
            max_cloud_cover: 30.0,
            max_items: 5,
            target_size: [256, 256],
            resampling: Resampling::Nearest,
            http_timeout_secs: 60,
            user_agent: format!("s2view/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ViewerConfig {
    /// Load configuration from a JSON file; absent fields keep their defaults
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ViewerResult<Self> {
        log::info!("Loading configuration from: {}", path.as_ref().display());

        let content = std::fs::read_to_string(path.as_ref())?;
        let config: ViewerConfig = serde_json::from_str(&content)
            .map_err(|e| ViewerError::Config(format!("Failed to parse {}: {}", path.as_ref().display(), e)))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ViewerResult<()> {
        if self.target_size.iter().any(|&s| s == 0) {
            return Err(ViewerError::Config(format!(
                "target_size must be non-zero, got {:?}",
                self.target_size
            )));
        }
        if self.max_items == 0 {
            return Err(ViewerError::Config("max_items must be at least 1".to_string()));
        }
        if !(0.0..=100.0).contains(&self.max_cloud_cover) {
            return Err(ViewerError::Config(format!(
                "max_cloud_cover must be a percentage, got {}",
                self.max_cloud_cover
            )));
        }
        Ok(())
    }

    pub fn target_shape(&self) -> (usize, usize) {
        (self.target_size[0], self.target_size[1])
    }

    pub(crate) fn http_client(&self) -> ViewerResult<reqwest::blocking::Client> {
        reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(self.http_timeout_secs))
            .user_agent(self.user_agent.clone())
            .build()
            .map_err(|e| ViewerError::Config(format!("Failed to create HTTP client: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_viewer() {
        let config = ViewerConfig::default();
        assert_eq!(config.collection, "sentinel-2-l2a");
        assert_eq!(config.max_items, 5);
        assert_eq!(config.target_shape(), (256, 256));
        assert_eq!(config.resampling, Resampling::Nearest);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"max_items": 3, "target_size": [128, 64], "resampling": "bilinear"}}"#).unwrap();

        let config = ViewerConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.max_items, 3);
        assert_eq!(config.target_shape(), (128, 64));
        assert_eq!(config.resampling, Resampling::Bilinear);
        assert_eq!(config.max_cloud_cover, 30.0);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"target_size": [0, 256]}}"#).unwrap();
        assert!(matches!(
            ViewerConfig::from_json_file(file.path()),
            Err(ViewerError::Config(_))
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(ViewerConfig::from_json_file(file.path()).is_err());
    }
}
