//! HTTP model probe
//!
//! HEAD for reachability, GET plus JSON validation for weights manifests.
//! A manifest is the usual list of `{ "paths": [...], "weights": [...] }`
//! groups; a manifest with no shard paths is rejected.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::traits::{ModelManifest, ModelProbe};
use super::DetectorError;

/// Model probe over reqwest
#[derive(Clone, Debug)]
pub struct HttpModelProbe {
    http_client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ManifestGroup {
    #[serde(default)]
    paths: Vec<String>,
}

impl HttpModelProbe {
    /// Create a probe whose requests give up after `timeout`
    pub fn new(timeout: Duration) -> Result<Self, DetectorError> {
        Ok(Self {
            http_client: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }
}

/// Parse a weights manifest body
pub fn parse_manifest(body: &[u8]) -> Result<ModelManifest, DetectorError> {
    let groups: Vec<ManifestGroup> =
        serde_json::from_slice(body).map_err(|e| DetectorError::InvalidManifest(e.to_string()))?;
    let shards: Vec<String> = groups.into_iter().flat_map(|g| g.paths).collect();
    if shards.is_empty() {
        return Err(DetectorError::InvalidManifest(
            "manifest lists no weight shards".to_string(),
        ));
    }
    Ok(ModelManifest { shards })
}

#[async_trait]
impl ModelProbe for HttpModelProbe {
    async fn reachable(&self, url: &str) -> Result<(), DetectorError> {
        let response = self.http_client.head(url).send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(DetectorError::Unreachable {
                location: url.to_string(),
                reason: format!("status {}", response.status()),
            })
        }
    }

    async fn fetch_manifest(&self, url: &str) -> Result<ModelManifest, DetectorError> {
        let response = self.http_client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(DetectorError::Unreachable {
                location: url.to_string(),
                reason: format!("status {}", response.status()),
            });
        }
        let body = response.bytes().await?;
        parse_manifest(&body)
    }
}
