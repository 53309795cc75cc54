//! CNN backend
//!
//! Direct 48x48 grayscale face CNN trained on FER-2013. The upstream runtime
//! hands us the softmax; we take the argmax. Loading prefers GPU compute and
//! falls back to CPU when the runtime cannot provide it.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::traits::{
    BackendKind, Classification, EmotionBackend, FrameFeatures, ModelManifest, ModelProbe,
    ModelSource, VideoFrame,
};
use super::DetectorError;
use crate::emotion::EmotionLabel;

/// Model topology file under a remote source
pub const MODEL_MANIFEST: &str = "model.json";

/// Output order of FER-2013 classifiers
pub const FER_ORDER: [EmotionLabel; 7] = [
    EmotionLabel::Angry,
    EmotionLabel::Disgust,
    EmotionLabel::Fear,
    EmotionLabel::Happy,
    EmotionLabel::Neutral,
    EmotionLabel::Sad,
    EmotionLabel::Surprised,
];

/// Where inference runs
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputeTarget {
    /// Accelerated
    Gpu,
    /// Portable fallback
    Cpu,
}

/// Backend over FER-order softmax output
pub struct CnnBackend {
    probe: Option<Arc<dyn ModelProbe>>,
    available: Vec<ComputeTarget>,
    active: Option<(ComputeTarget, Option<ModelManifest>)>,
}

impl CnnBackend {
    /// Create a backend; `available` lists the compute targets the runtime offers
    pub fn new(probe: Option<Arc<dyn ModelProbe>>, available: Vec<ComputeTarget>) -> Self {
        Self {
            probe,
            available,
            active: None,
        }
    }

    /// Compute target in use once loaded
    #[must_use]
    pub fn compute(&self) -> Option<ComputeTarget> {
        self.active.as_ref().map(|(target, _)| *target)
    }

    /// Argmax over a FER-order softmax
    #[must_use]
    pub fn argmax(probabilities: &[f32]) -> Option<Classification> {
        if probabilities.len() != FER_ORDER.len() {
            return None;
        }
        let mut best = 0;
        for (idx, value) in probabilities.iter().enumerate() {
            if *value > probabilities[best] {
                best = idx;
            }
        }
        let scores: BTreeMap<EmotionLabel, f32> = FER_ORDER
            .iter()
            .copied()
            .zip(probabilities.iter().copied())
            .collect();
        Some(Classification {
            label: FER_ORDER[best],
            confidence: probabilities[best].clamp(0.0, 1.0),
            scores,
        })
    }
}

#[async_trait]
impl EmotionBackend for CnnBackend {
    fn name(&self) -> &str {
        "fer2013 cnn"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Cnn
    }

    async fn probe(&self, source: &ModelSource) -> Result<(), DetectorError> {
        match (source.file_url(MODEL_MANIFEST), &self.probe) {
            (None, _) => Ok(()),
            (Some(url), Some(probe)) => probe.reachable(&url).await,
            (Some(_), None) => Err(DetectorError::Unreachable {
                location: source.to_string(),
                reason: "no network probe configured".to_string(),
            }),
        }
    }

    async fn load(&mut self, source: &ModelSource) -> Result<(), DetectorError> {
        let manifest = match (source.file_url(MODEL_MANIFEST), &self.probe) {
            (Some(url), Some(probe)) => Some(probe.fetch_manifest(&url).await?),
            _ => None,
        };

        let target = [ComputeTarget::Gpu, ComputeTarget::Cpu]
            .into_iter()
            .find(|t| self.available.contains(t))
            .ok_or_else(|| DetectorError::LoadFailed("no compute target available".to_string()))?;
        if target == ComputeTarget::Cpu {
            tracing::warn!("GPU compute unavailable, running emotion CNN on CPU");
        }

        self.active = Some((target, manifest));
        Ok(())
    }

    async fn classify(&mut self, frame: &VideoFrame) -> Result<Option<Classification>, DetectorError> {
        if self.active.is_none() {
            return Err(DetectorError::NotLoaded);
        }
        match &frame.features {
            FrameFeatures::NoFace => Ok(None),
            FrameFeatures::Logits(probabilities) => Self::argmax(probabilities)
                .map(Some)
                .ok_or(DetectorError::UnsupportedFeatures {
                    backend: BackendKind::Cnn,
                }),
            _ => Err(DetectorError::UnsupportedFeatures {
                backend: BackendKind::Cnn,
            }),
        }
    }

    async fn release(&mut self) {
        self.active = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argmax_fer_order() {
        let result = CnnBackend::argmax(&[0.05, 0.0, 0.1, 0.6, 0.15, 0.05, 0.05]).unwrap();
        assert_eq!(result.label, EmotionLabel::Happy);
        assert!((result.confidence - 0.6).abs() < f32::EPSILON);

        let result = CnnBackend::argmax(&[0.0, 0.0, 0.0, 0.0, 0.0, 0.1, 0.9]).unwrap();
        assert_eq!(result.label, EmotionLabel::Surprised);
    }

    #[test]
    fn test_argmax_rejects_wrong_arity() {
        assert!(CnnBackend::argmax(&[0.5, 0.5]).is_none());
    }

    #[tokio::test]
    async fn test_load_falls_back_to_cpu() {
        let mut backend = CnnBackend::new(None, vec![ComputeTarget::Cpu]);
        backend.load(&ModelSource::Bundled).await.unwrap();
        assert_eq!(backend.compute(), Some(ComputeTarget::Cpu));

        let mut backend = CnnBackend::new(None, vec![ComputeTarget::Cpu, ComputeTarget::Gpu]);
        backend.load(&ModelSource::Bundled).await.unwrap();
        assert_eq!(backend.compute(), Some(ComputeTarget::Gpu));
    }

    #[tokio::test]
    async fn test_load_without_compute_fails() {
        let mut backend = CnnBackend::new(None, Vec::new());
        assert!(backend.load(&ModelSource::Bundled).await.is_err());
        assert!(backend.compute().is_none());
    }

    #[tokio::test]
    async fn test_classify_rejects_wrong_features() {
        let mut backend = CnnBackend::new(None, vec![ComputeTarget::Cpu]);
        backend.load(&ModelSource::Bundled).await.unwrap();
        let frame = VideoFrame::new(48, 48, FrameFeatures::Logits(vec![0.1; 3]));
        assert!(backend.classify(&frame).await.is_err());
    }
}
