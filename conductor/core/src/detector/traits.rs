//! Detector Traits
//!
//! The contract between the adapter and whatever actually classifies faces.
//!
//! # Design Philosophy
//!
//! Inference runs outside this crate. A frame arrives with the raw output
//! of the upstream face model already attached ([`FrameFeatures`]); a
//! backend's job is to turn that output into one normalized
//! [`Classification`]. Backends also own their model assets, which they
//! locate through an ordered list of [`ModelSource`]s.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::DetectorError;
use crate::emotion::EmotionLabel;

/// Upstream model output attached to a frame
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "values", rename_all = "snake_case")]
pub enum FrameFeatures {
    /// No face was found
    NoFace,
    /// Face-mesh blendshape coefficients by name
    Blendshapes(BTreeMap<String, f32>),
    /// Expression-net probabilities, in the order the net reported them
    Expressions(Vec<(String, f32)>),
    /// Seven-way softmax in FER-2013 order
    Logits(Vec<f32>),
}

/// One captured video frame
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VideoFrame {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Capture time
    #[serde(default = "Utc::now")]
    pub captured_at: DateTime<Utc>,
    /// Upstream model output
    pub features: FrameFeatures,
}

impl VideoFrame {
    /// Frame captured now
    #[must_use]
    pub fn new(width: u32, height: u32, features: FrameFeatures) -> Self {
        Self {
            width,
            height,
            captured_at: Utc::now(),
            features,
        }
    }

    /// Whether the frame has a usable size
    #[must_use]
    pub fn has_dimensions(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

/// Backend verdict for one frame
#[derive(Clone, Debug, PartialEq)]
pub struct Classification {
    /// Dominant label
    pub label: EmotionLabel,
    /// Confidence in `[0, 1]`
    pub confidence: f32,
    /// Per-label scores
    pub scores: BTreeMap<EmotionLabel, f32>,
}

/// Which family a backend belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Face mesh with blendshape heuristics
    Blendshape,
    /// Face landmarks plus an expression net
    Expression,
    /// Direct CNN over a cropped face
    Cnn,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Blendshape => "blendshape",
            Self::Expression => "expression",
            Self::Cnn => "cnn",
        })
    }
}

/// Where a backend's model assets come from
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelSource {
    /// Shipped with the runtime; nothing to probe
    Bundled,
    /// Base URL holding the model files
    Remote(String),
}

impl ModelSource {
    /// Remote source from a base URL
    pub fn remote(url: impl Into<String>) -> Self {
        Self::Remote(url.into())
    }

    /// URL of `file` under this source, if remote
    #[must_use]
    pub fn file_url(&self, file: &str) -> Option<String> {
        match self {
            Self::Bundled => None,
            Self::Remote(base) => Some(format!("{}/{file}", base.trim_end_matches('/'))),
        }
    }
}

impl fmt::Display for ModelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bundled => f.write_str("bundled"),
            Self::Remote(url) => f.write_str(url),
        }
    }
}

/// Parsed weights manifest
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelManifest {
    /// Weight shard paths listed by the manifest
    pub shards: Vec<String>,
}

/// Network access to model assets
#[async_trait]
pub trait ModelProbe: Send + Sync {
    /// Cheap reachability check for one asset
    async fn reachable(&self, url: &str) -> Result<(), DetectorError>;

    /// Download and validate a weights manifest
    async fn fetch_manifest(&self, url: &str) -> Result<ModelManifest, DetectorError>;
}

/// A face emotion classifier
///
/// Backends are driven exclusively by
/// [`DetectorAdapter`](super::DetectorAdapter), which serializes access.
#[async_trait]
pub trait EmotionBackend: Send + Sync {
    /// Human-readable backend name
    fn name(&self) -> &str;

    /// Backend family
    fn kind(&self) -> BackendKind;

    /// Check that `source` can serve this backend's assets
    async fn probe(&self, _source: &ModelSource) -> Result<(), DetectorError> {
        Ok(())
    }

    /// Load model assets from `source`
    async fn load(&mut self, source: &ModelSource) -> Result<(), DetectorError>;

    /// Classify one frame; `Ok(None)` when no face is present
    async fn classify(&mut self, frame: &VideoFrame) -> Result<Option<Classification>, DetectorError>;

    /// Release loaded resources
    async fn release(&mut self);
}

/// Supplies frames to the detection ticker
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Latest frame, or `None` if the camera has nothing yet
    async fn next_frame(&self) -> Option<VideoFrame>;
}
