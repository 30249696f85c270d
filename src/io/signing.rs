use crate::config::ViewerConfig;
use crate::types::{ViewerError, ViewerResult};
use reqwest::Url;
use serde::Deserialize;

/// Turns an asset href into a reference GDAL can open
pub trait AssetSigner: Send + Sync {
    fn sign(&self, href: &str) -> ViewerResult<String>;
}

/// Uses hrefs unchanged (local files, public buckets)
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughSigner;

impl AssetSigner for PassthroughSigner {
    fn sign(&self, href: &str) -> ViewerResult<String> {
        Ok(href.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct SasToken {
    token: String,
    #[serde(rename = "msft:expiry")]
    expiry: Option<String>,
}

/// Signs Azure blob storage hrefs with short-lived Planetary Computer SAS tokens
pub struct PlanetaryComputerSigner {
    client: reqwest::blocking::Client,
    sas_endpoint: String,
}

impl PlanetaryComputerSigner {
    pub fn new(config: &ViewerConfig) -> ViewerResult<Self> {
        Ok(Self {
            client: config.http_client()?,
            sas_endpoint: config.sas_endpoint.trim_end_matches('/').to_string(),
        })
    }

    fn fetch_token(&self, account: &str, container: &str) -> ViewerResult<SasToken> {
        let url = format!("{}/token/{}/{}", self.sas_endpoint, account, container);
        log::debug!("Requesting SAS token: {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| ViewerError::unreadable(&url, format!("token request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(ViewerError::unreadable(
                &url,
                format!("token request returned HTTP {}", response.status().as_u16()),
            ));
        }

        response
            .json::<SasToken>()
            .map_err(|e| ViewerError::unreadable(&url, format!("malformed token response: {}", e)))
    }
}

impl AssetSigner for PlanetaryComputerSigner {
    fn sign(&self, href: &str) -> ViewerResult<String> {
        let Some((account, container)) = blob_storage_target(href) else {
            return Ok(href.to_string());
        };

        let token = self
            .fetch_token(&account, &container)
            .map_err(|e| match e {
                ViewerError::AssetUnreadable { reason, .. } => ViewerError::unreadable(href, reason),
                other => other,
            })?;
        if let Some(expiry) = &token.expiry {
            log::debug!("SAS token for {}/{} expires at {}", account, container, expiry);
        }

        Ok(append_token(href, &token.token))
    }
}

/// `(account, container)` for `https://<account>.blob.core.windows.net/<container>/...`
pub(crate) fn blob_storage_target(href: &str) -> Option<(String, String)> {
    let url = Url::parse(href).ok()?;
    let host = url.host_str()?;
    let account = host.strip_suffix(".blob.core.windows.net")?;
    let container = url.path_segments()?.next().filter(|s| !s.is_empty())?;

    Some((account.to_string(), container.to_string()))
}

pub(crate) fn append_token(href: &str, token: &str) -> String {
    let token = token.trim_start_matches('?');
    if href.contains('?') {
        format!("{}&{}", href, token)
    } else {
        format!("{}?{}", href, token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const B04: &str = "https://sentinel2l2a01.blob.core.windows.net/sentinel2-l2/31/U/DQ/2024/06/12/S2A_MSIL2A_20240612T105621_N0510_R094_T31UDQ_20240612T164027.SAFE/GRANULE/L2A_T31UDQ_A046805_20240612T105936/IMG_DATA/R10m/T31UDQ_20240612T105621_B04_10m.tif";

    #[test]
    fn test_blob_storage_target() {
        assert_eq!(
            blob_storage_target(B04),
            Some(("sentinel2l2a01".to_string(), "sentinel2-l2".to_string()))
        );
        assert_eq!(blob_storage_target("https://example.com/data/B04.tif"), None);
        assert_eq!(blob_storage_target("/tmp/B04.tif"), None);
    }

    #[test]
    fn test_append_token() {
        assert_eq!(append_token("https://a/b.tif", "st=1&se=2"), "https://a/b.tif?st=1&se=2");
        assert_eq!(append_token("https://a/b.tif?x=1", "?st=1"), "https://a/b.tif?x=1&st=1");
    }

    #[test]
    fn test_passthrough_signer() {
        assert_eq!(PassthroughSigner.sign("/data/B04.tif").unwrap(), "/data/B04.tif");
    }

    #[test]
    fn test_non_blob_hrefs_are_not_signed() {
        let signer = PlanetaryComputerSigner::new(&ViewerConfig::default()).unwrap();
        assert_eq!(signer.sign("/data/B04.tif").unwrap(), "/data/B04.tif");
    }

    #[test]
    #[ignore = "requires network access to planetarycomputer.microsoft.com"]
    fn test_sign_planetary_computer_href() {
        let signer = PlanetaryComputerSigner::new(&ViewerConfig::default()).unwrap();
        let signed = signer.sign(B04).unwrap();
        assert!(signed.starts_with(B04));
        assert!(signed.contains("sig="));
    }
}
