//! Blendshape backend
//!
//! Scores emotions from face-mesh blendshape coefficients. Each mapped
//! coefficient adds its value to one emotion, then a set of compound rules
//! (smile plus cheek raise, frown plus lowered brows, ...) add fixed boosts.
//! Neutral starts at a baseline and is pushed down whenever some other
//! emotion is clearly present.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::traits::{
    BackendKind, Classification, EmotionBackend, FrameFeatures, ModelProbe, ModelSource,
    VideoFrame,
};
use super::DetectorError;
use crate::emotion::EmotionLabel;

/// Face landmarker asset under a remote source
pub const LANDMARKER_ASSET: &str = "face_landmarker.task";

/// Neutral score before any evidence
const NEUTRAL_BASELINE: f32 = 0.3;

/// Coefficient → emotion contributions
const SHAPE_MAP: &[(&str, EmotionLabel)] = &[
    ("mouthSmileLeft", EmotionLabel::Happy),
    ("mouthSmileRight", EmotionLabel::Happy),
    ("cheekSquintLeft", EmotionLabel::Happy),
    ("cheekSquintRight", EmotionLabel::Happy),
    ("mouthFrownLeft", EmotionLabel::Sad),
    ("mouthFrownRight", EmotionLabel::Sad),
    ("browDownLeft", EmotionLabel::Sad),
    ("browDownRight", EmotionLabel::Sad),
    ("browLowererLeft", EmotionLabel::Angry),
    ("browLowererRight", EmotionLabel::Angry),
    ("eyeSquintLeft", EmotionLabel::Angry),
    ("eyeSquintRight", EmotionLabel::Angry),
    ("jawOpen", EmotionLabel::Surprised),
    ("browInnerUp", EmotionLabel::Fear),
    ("eyeWideLeft", EmotionLabel::Fear),
    ("eyeWideRight", EmotionLabel::Fear),
    ("noseSneerLeft", EmotionLabel::Disgust),
    ("noseSneerRight", EmotionLabel::Disgust),
    ("mouthUpperUpLeft", EmotionLabel::Disgust),
    ("mouthUpperUpRight", EmotionLabel::Disgust),
];

/// Backend over face-mesh blendshapes
pub struct BlendshapeBackend {
    probe: Option<Arc<dyn ModelProbe>>,
    loaded_from: Option<ModelSource>,
}

impl BlendshapeBackend {
    /// Backend using bundled assets only
    #[must_use]
    pub fn new() -> Self {
        Self {
            probe: None,
            loaded_from: None,
        }
    }

    /// Backend that checks remote sources with `probe`
    #[must_use]
    pub fn with_probe(probe: Arc<dyn ModelProbe>) -> Self {
        Self {
            probe: Some(probe),
            loaded_from: None,
        }
    }

    /// Score one set of coefficients
    #[must_use]
    pub fn score(shapes: &BTreeMap<String, f32>) -> Classification {
        let mut scores: BTreeMap<EmotionLabel, f32> =
            EmotionLabel::ALL.iter().map(|l| (*l, 0.0)).collect();

        if shapes.is_empty() {
            scores.insert(EmotionLabel::Neutral, 0.5);
            return Classification {
                label: EmotionLabel::Neutral,
                confidence: 0.5,
                scores,
            };
        }

        scores.insert(EmotionLabel::Neutral, NEUTRAL_BASELINE);
        for (name, label) in SHAPE_MAP {
            if let Some(value) = shapes.get(*name) {
                *scores.entry(*label).or_default() += value;
            }
        }

        apply_rules(&mut scores, shapes);

        // neutral first, then declaration order; strictly greater wins
        let mut label = EmotionLabel::Neutral;
        let mut best = scores[&EmotionLabel::Neutral];
        for candidate in EmotionLabel::ALL {
            let value = scores[&candidate];
            if value > best {
                best = value;
                label = candidate;
            }
        }

        Classification {
            label,
            confidence: best.clamp(0.1, 1.0),
            scores,
        }
    }
}

impl Default for BlendshapeBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn apply_rules(scores: &mut BTreeMap<EmotionLabel, f32>, shapes: &BTreeMap<String, f32>) {
    let get = |name: &str| shapes.get(name).copied().unwrap_or(0.0);
    let pair = |left: &str, right: &str| (get(left) + get(right)) / 2.0;
    let mut boost = |label: EmotionLabel, amount: f32| {
        *scores.entry(label).or_default() += amount;
    };

    let cheek_raise = pair("cheekSquintLeft", "cheekSquintRight");
    if get("mouthSmileLeft") > 0.3 || get("mouthSmileRight") > 0.3 {
        boost(EmotionLabel::Happy, 0.4);
        if cheek_raise > 0.2 {
            boost(EmotionLabel::Happy, 0.3);
        }
    }

    let brow_down = pair("browDownLeft", "browDownRight");
    if get("mouthFrownLeft") > 0.2 || get("mouthFrownRight") > 0.2 {
        boost(EmotionLabel::Sad, 0.4);
        if brow_down > 0.2 {
            boost(EmotionLabel::Sad, 0.3);
        }
    }

    let brow_lowerer = pair("browLowererLeft", "browLowererRight");
    let eye_squint = pair("eyeSquintLeft", "eyeSquintRight");
    if brow_lowerer > 0.3 {
        boost(EmotionLabel::Angry, 0.4);
        if eye_squint > 0.2 {
            boost(EmotionLabel::Angry, 0.3);
        }
    }

    let brow_inner_up = get("browInnerUp");
    let eye_wide = pair("eyeWideLeft", "eyeWideRight");
    let jaw_open = get("jawOpen");
    if brow_inner_up > 0.3 && eye_wide > 0.3 {
        boost(EmotionLabel::Surprised, 0.5);
        if jaw_open > 0.2 {
            boost(EmotionLabel::Surprised, 0.3);
        }
    }
    if brow_inner_up > 0.4 && eye_wide > 0.4 && jaw_open < 0.1 {
        boost(EmotionLabel::Fear, 0.4);
    }

    let nose_sneer = pair("noseSneerLeft", "noseSneerRight");
    let upper_lip = pair("mouthUpperUpLeft", "mouthUpperUpRight");
    if nose_sneer > 0.3 || upper_lip > 0.3 {
        boost(EmotionLabel::Disgust, 0.4);
    }

    let strongest = scores
        .iter()
        .filter(|(label, _)| **label != EmotionLabel::Neutral)
        .map(|(_, v)| *v)
        .fold(0.0_f32, f32::max);
    if strongest > 0.3 {
        let neutral = scores.entry(EmotionLabel::Neutral).or_default();
        *neutral = (*neutral - strongest).max(0.1);
    }
}

#[async_trait]
impl EmotionBackend for BlendshapeBackend {
    fn name(&self) -> &str {
        "face-mesh blendshapes"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Blendshape
    }

    async fn probe(&self, source: &ModelSource) -> Result<(), DetectorError> {
        match (source.file_url(LANDMARKER_ASSET), &self.probe) {
            (Some(url), Some(probe)) => probe.reachable(&url).await,
            (Some(_), None) => Err(DetectorError::Unreachable {
                location: source.to_string(),
                reason: "no network probe configured".to_string(),
            }),
            (None, _) => Ok(()),
        }
    }

    async fn load(&mut self, source: &ModelSource) -> Result<(), DetectorError> {
        self.loaded_from = Some(source.clone());
        Ok(())
    }

    async fn classify(&mut self, frame: &VideoFrame) -> Result<Option<Classification>, DetectorError> {
        if self.loaded_from.is_none() {
            return Err(DetectorError::NotLoaded);
        }
        match &frame.features {
            FrameFeatures::NoFace => Ok(None),
            FrameFeatures::Blendshapes(shapes) => Ok(Some(Self::score(shapes))),
            _ => Err(DetectorError::UnsupportedFeatures {
                backend: BackendKind::Blendshape,
            }),
        }
    }

    async fn release(&mut self) {
        self.loaded_from = None;
    }
}
