//! Expression-net backend
//!
//! A tiny face detector plus an expression classifier. The upstream net
//! reports one probability per expression; the largest wins and vendor
//! names are folded into [`EmotionLabel`]. Unknown names count as neutral.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::traits::{
    BackendKind, Classification, EmotionBackend, FrameFeatures, ModelManifest, ModelProbe,
    ModelSource, VideoFrame,
};
use super::DetectorError;
use crate::emotion::EmotionLabel;

/// Face detector weights manifest
pub const DETECTOR_MANIFEST: &str = "tiny_face_detector_model-weights_manifest.json";

/// Expression net weights manifest
pub const EXPRESSION_MANIFEST: &str = "face_expression_model-weights_manifest.json";

/// Public mirrors of the expression weights, in preference order
pub const DEFAULT_SOURCES: [&str; 3] = [
    "https://cdn.jsdelivr.net/gh/justadudewhohacks/face-api.js/weights",
    "https://raw.githubusercontent.com/justadudewhohacks/face-api.js/master/weights",
    "https://cdn.jsdelivr.net/npm/@vladmandic/face-api@1.7.12/model",
];

/// Backend over expression-net probabilities
pub struct ExpressionBackend {
    probe: Arc<dyn ModelProbe>,
    manifests: Option<(ModelManifest, ModelManifest)>,
}

impl ExpressionBackend {
    /// Create a backend that fetches weights through `probe`
    pub fn new(probe: Arc<dyn ModelProbe>) -> Self {
        Self {
            probe,
            manifests: None,
        }
    }

    /// Ordered default sources
    #[must_use]
    pub fn default_sources() -> Vec<ModelSource> {
        DEFAULT_SOURCES.iter().map(|u| ModelSource::remote(*u)).collect()
    }

    /// Pick the dominant expression
    ///
    /// On equal probabilities the later entry wins.
    #[must_use]
    pub fn dominant(expressions: &[(String, f32)]) -> Option<Classification> {
        let (name, value) = expressions.iter().fold(None, |best: Option<&(String, f32)>, entry| {
            match best {
                Some(b) if b.1 > entry.1 => Some(b),
                _ => Some(entry),
            }
        })?;

        let mut scores = BTreeMap::new();
        for (key, prob) in expressions {
            let label = EmotionLabel::from_vendor(key).unwrap_or(EmotionLabel::Neutral);
            let slot = scores.entry(label).or_insert(0.0_f32);
            *slot = slot.max(*prob);
        }

        Some(Classification {
            label: EmotionLabel::from_vendor(name).unwrap_or(EmotionLabel::Neutral),
            confidence: value.clamp(0.0, 1.0),
            scores,
        })
    }
}

#[async_trait]
impl EmotionBackend for ExpressionBackend {
    fn name(&self) -> &str {
        "face landmarks + expression net"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Expression
    }

    async fn probe(&self, source: &ModelSource) -> Result<(), DetectorError> {
        match source.file_url(DETECTOR_MANIFEST) {
            Some(url) => self.probe.reachable(&url).await,
            None => Err(DetectorError::LoadFailed(
                "expression weights are not bundled".to_string(),
            )),
        }
    }

    async fn load(&mut self, source: &ModelSource) -> Result<(), DetectorError> {
        let (Some(detector_url), Some(expression_url)) = (
            source.file_url(DETECTOR_MANIFEST),
            source.file_url(EXPRESSION_MANIFEST),
        ) else {
            return Err(DetectorError::LoadFailed(
                "expression weights are not bundled".to_string(),
            ));
        };

        let detector = self.probe.fetch_manifest(&detector_url).await?;
        let expression = self.probe.fetch_manifest(&expression_url).await?;
        tracing::debug!(
            source = %source,
            detector_shards = detector.shards.len(),
            expression_shards = expression.shards.len(),
            "Expression weights ready"
        );
        self.manifests = Some((detector, expression));
        Ok(())
    }

    async fn classify(&mut self, frame: &VideoFrame) -> Result<Option<Classification>, DetectorError> {
        if self.manifests.is_none() {
            return Err(DetectorError::NotLoaded);
        }
        match &frame.features {
            FrameFeatures::NoFace => Ok(None),
            FrameFeatures::Expressions(expressions) => Ok(Self::dominant(expressions)),
            _ => Err(DetectorError::UnsupportedFeatures {
                backend: BackendKind::Expression,
            }),
        }
    }

    async fn release(&mut self) {
        self.manifests = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expressions(pairs: &[(&str, f32)]) -> Vec<(String, f32)> {
        pairs.iter().map(|(k, v)| ((*k).to_string(), *v)).collect()
    }

    #[test]
    fn test_dominant_maps_vendor_names() {
        let result = ExpressionBackend::dominant(&expressions(&[
            ("neutral", 0.1),
            ("fearful", 0.7),
            ("disgusted", 0.2),
        ]))
        .unwrap();
        assert_eq!(result.label, EmotionLabel::Fear);
        assert!((result.confidence - 0.7).abs() < f32::EPSILON);
        assert!(result.scores.contains_key(&EmotionLabel::Disgust));
    }

    #[test]
    fn test_dominant_tie_takes_later_entry() {
        let result =
            ExpressionBackend::dominant(&expressions(&[("happy", 0.5), ("sad", 0.5)])).unwrap();
        assert_eq!(result.label, EmotionLabel::Sad);
    }

    #[test]
    fn test_unknown_name_is_neutral() {
        let result = ExpressionBackend::dominant(&expressions(&[("contempt", 0.9)])).unwrap();
        assert_eq!(result.label, EmotionLabel::Neutral);
        assert!(ExpressionBackend::dominant(&[]).is_none());
    }

    #[test]
    fn test_default_sources_ordered() {
        let sources = ExpressionBackend::default_sources();
        assert_eq!(sources.len(), 3);
        assert_eq!(
            sources[0].file_url(DETECTOR_MANIFEST).unwrap(),
            format!("{}/{DETECTOR_MANIFEST}", DEFAULT_SOURCES[0])
        );
    }
}
