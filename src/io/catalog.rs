use crate::config::ViewerConfig;
use crate::types::{BoundingBox, DateRange, SceneRecord, ViewerError, ViewerResult};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use std::collections::{BTreeMap, HashMap};

/// Catalog search request
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub bbox: BoundingBox,
    pub date_range: Option<DateRange>,
    /// Scenes must have cloud cover strictly below this percentage
    pub max_cloud_cover: f64,
    pub max_items: usize,
}

impl SearchQuery {
    pub fn new(bbox: BoundingBox, date_range: Option<DateRange>, config: &ViewerConfig) -> Self {
        Self {
            bbox,
            date_range,
            max_cloud_cover: config.max_cloud_cover,
            max_items: config.max_items,
        }
    }
}

/// Source of scene records
pub trait SceneCatalog {
    /// Matching scenes in catalog order; never empty on success
    fn search(&self, query: &SearchQuery) -> ViewerResult<Vec<SceneRecord>>;
}

/// STAC API client
pub struct StacCatalog {
    client: reqwest::blocking::Client,
    search_url: String,
    collection: String,
}

impl StacCatalog {
    pub fn new(config: &ViewerConfig) -> ViewerResult<Self> {
        Ok(Self {
            client: config.http_client()?,
            search_url: format!("{}/search", config.catalog_url.trim_end_matches('/')),
            collection: config.collection.clone(),
        })
    }

    fn request_body(&self, query: &SearchQuery) -> serde_json::Value {
        let mut body = json!({
            "collections": [self.collection],
            "bbox": query.bbox.to_array(),
            "query": { "eo:cloud_cover": { "lt": query.max_cloud_cover } },
            "limit": query.max_items,
        });
        if let Some(range) = &query.date_range {
            body["datetime"] = json!(range.to_interval());
        }
        body
    }
}

impl SceneCatalog for StacCatalog {
    fn search(&self, query: &SearchQuery) -> ViewerResult<Vec<SceneRecord>> {
        log::info!("Searching {} for {} scenes", self.search_url, self.collection);
        log::debug!("Search bbox: {:?}, dates: {:?}", query.bbox, query.date_range);

        let response = self
            .client
            .post(&self.search_url)
            .json(&self.request_body(query))
            .send()
            .map_err(|e| ViewerError::Catalog(format!("Search request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(ViewerError::Catalog(format!(
                "Search returned HTTP {} {}",
                response.status().as_u16(),
                response.status().canonical_reason().unwrap_or("")
            )));
        }

        let text = response
            .text()
            .map_err(|e| ViewerError::Catalog(format!("Failed to read search response: {}", e)))?;
        let scenes = parse_search_response(&text, query.max_items)?;

        log::info!("Found {} scenes", scenes.len());
        if scenes.is_empty() {
            return Err(ViewerError::NoResults);
        }
        Ok(scenes)
    }
}

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    id: String,
    properties: Properties,
    #[serde(default)]
    assets: HashMap<String, Asset>,
}

#[derive(Debug, Deserialize)]
struct Properties {
    datetime: Option<DateTime<Utc>>,
    #[serde(rename = "eo:cloud_cover")]
    cloud_cover: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Asset {
    href: String,
}

/// Parse a STAC ItemCollection, keeping at most `max_items` features in order
pub(crate) fn parse_search_response(text: &str, max_items: usize) -> ViewerResult<Vec<SceneRecord>> {
    let collection: FeatureCollection = serde_json::from_str(text)
        .map_err(|e| ViewerError::Catalog(format!("Malformed search response: {}", e)))?;

    let mut scenes = Vec::new();
    for feature in collection.features.into_iter().take(max_items) {
        let Some(datetime) = feature.properties.datetime else {
            log::warn!("Skipping item {} without a datetime", feature.id);
            continue;
        };

        let assets: BTreeMap<String, String> = feature
            .assets
            .into_iter()
            .map(|(band, asset)| (band, asset.href))
            .collect();

        scenes.push(SceneRecord {
            id: feature.id,
            datetime,
            cloud_cover: feature.properties.cloud_cover,
            assets,
        });
    }

    Ok(scenes)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESPONSE: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "id": "S2B_MSIL2A_20240617T105619_R094_T31UDQ",
                "properties": { "datetime": "2024-06-17T10:56:19.024000Z", "eo:cloud_cover": 12.5 },
                "assets": {
                    "B04": { "href": "https://example.blob.core.windows.net/c/B04.tif" },
                    "B03": { "href": "https://example.blob.core.windows.net/c/B03.tif" }
                }
            },
            {
                "id": "S2A_MSIL2A_20240612T105621_R094_T31UDQ",
                "properties": { "datetime": "2024-06-12T10:56:21.024000Z" },
                "assets": { "B04": { "href": "https://example.blob.core.windows.net/c/B04b.tif" } }
            },
            {
                "id": "S2A_MSIL2A_20240609T104621_R051_T31UDQ",
                "properties": { "datetime": "2024-06-09T10:46:21.024000Z", "eo:cloud_cover": 1.0 },
                "assets": {}
            }
        ]
    }"#;

    #[test]
    fn test_parse_search_response_preserves_order() {
        let scenes = parse_search_response(RESPONSE, 5).unwrap();
        assert_eq!(scenes.len(), 3);
        assert_eq!(scenes[0].id, "S2B_MSIL2A_20240617T105619_R094_T31UDQ");
        assert_eq!(scenes[0].cloud_cover, Some(12.5));
        assert_eq!(scenes[0].assets["B03"], "https://example.blob.core.windows.net/c/B03.tif");
        assert_eq!(scenes[1].cloud_cover, None);
        assert_eq!(scenes[1].label(), "2024-06-12 10:56 | Cloud NA%");
    }

    #[test]
    fn test_parse_search_response_truncates() {
        let scenes = parse_search_response(RESPONSE, 2).unwrap();
        assert_eq!(scenes.len(), 2);
        assert_eq!(scenes[1].id, "S2A_MSIL2A_20240612T105621_R094_T31UDQ");
    }

    #[test]
    fn test_parse_empty_and_malformed() {
        assert!(parse_search_response(r#"{"features": []}"#, 5).unwrap().is_empty());
        assert!(matches!(
            parse_search_response("<html>", 5),
            Err(ViewerError::Catalog(_))
        ));
    }

    #[test]
    fn test_request_body() {
        let config = ViewerConfig::default();
        let catalog = StacCatalog::new(&config).unwrap();
        let bbox = BoundingBox::new(2.2745, 48.8384, 2.3145, 48.8784).unwrap();

        let query = SearchQuery::new(bbox, None, &config);
        let body = catalog.request_body(&query);
        assert_eq!(body["collections"][0], "sentinel-2-l2a");
        assert_eq!(body["query"]["eo:cloud_cover"]["lt"], 30.0);
        assert_eq!(body["limit"], 5);
        assert!(body.get("datetime").is_none());

        let range = DateRange::new(
            chrono::NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            chrono::NaiveDate::from_ymd_opt(2024, 6, 30).unwrap(),
        )
        .unwrap();
        let body = catalog.request_body(&SearchQuery::new(bbox, Some(range), &config));
        assert_eq!(body["datetime"], "2024-06-01/2024-06-30");
    }

    #[test]
    #[ignore = "requires network access to planetarycomputer.microsoft.com"]
    fn test_search_planetary_computer() {
        let config = ViewerConfig::default();
        let catalog = StacCatalog::new(&config).unwrap();
        let bbox = BoundingBox::around(48.8584, 2.2945, 0.02).unwrap();

        let scenes = catalog.search(&SearchQuery::new(bbox, None, &config)).unwrap();
        assert!(!scenes.is_empty() && scenes.len() <= 5);
        assert!(scenes.iter().all(|s| s.assets.contains_key("B04")));
    }
}
