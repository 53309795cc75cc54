//! Emotion Vocabulary
//!
//! The closed set of labels every detector backend is normalized into, the
//! immutable per-frame sample, and a small newest-first history used by
//! surfaces that show "recent detections".
//!
//! # Design Philosophy
//!
//! Backends speak different dialects (`surprise` vs `surprised`, `fearful`
//! vs `fear`). All of that is folded into [`EmotionLabel`] at the adapter
//! boundary so nothing downstream ever sees a vendor string.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of samples kept by [`RecentSamples`] unless configured otherwise
pub const DEFAULT_RECENT_CAPACITY: usize = 5;

/// Normalized emotion label
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmotionLabel {
    /// No dominant expression
    Neutral,
    /// Smiling, cheerful
    Happy,
    /// Frowning, low
    Sad,
    /// Lowered brows, tension
    Angry,
    /// Raised brows, open jaw
    Surprised,
    /// Wide eyes without an open jaw
    Fear,
    /// Nose wrinkle, raised upper lip
    Disgust,
}

impl EmotionLabel {
    /// Every label, in declaration order
    pub const ALL: [EmotionLabel; 7] = [
        EmotionLabel::Neutral,
        EmotionLabel::Happy,
        EmotionLabel::Sad,
        EmotionLabel::Angry,
        EmotionLabel::Surprised,
        EmotionLabel::Fear,
        EmotionLabel::Disgust,
    ];

    /// Canonical lowercase name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Neutral => "neutral",
            Self::Happy => "happy",
            Self::Sad => "sad",
            Self::Angry => "angry",
            Self::Surprised => "surprised",
            Self::Fear => "fear",
            Self::Disgust => "disgust",
        }
    }

    /// Parse a label from any backend vocabulary
    ///
    /// Accepts the canonical names plus the aliases used by expression and
    /// FER-style classifiers. Matching is case-insensitive.
    #[must_use]
    pub fn from_vendor(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "neutral" => Some(Self::Neutral),
            "happy" | "happiness" => Some(Self::Happy),
            "sad" | "sadness" => Some(Self::Sad),
            "angry" | "anger" => Some(Self::Angry),
            "surprised" | "surprise" => Some(Self::Surprised),
            "fear" | "fearful" => Some(Self::Fear),
            "disgust" | "disgusted" => Some(Self::Disgust),
            _ => None,
        }
    }

    /// Invitation shown alongside a verdict for this label
    #[must_use]
    pub fn invitation(&self) -> &'static str {
        match self {
            Self::Neutral => {
                "You seem to be feeling neutral. Would you like to start a session to check in?"
            }
            Self::Happy => "You look happy! Would you like to talk about what's bringing you joy?",
            Self::Sad => "You seem sad. Would you like to talk about what you're feeling?",
            Self::Angry => "You seem upset. Would you like a safe space to talk it through?",
            Self::Surprised => "You seem surprised. Would you like to explore this feeling?",
            Self::Fear => "You seem to be feeling fearful. Would you like a safe space to talk?",
            Self::Disgust => "You seem to be feeling disgust. Would you like to discuss it?",
        }
    }
}

impl fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One classification of one frame
///
/// Samples are never mutated after construction; `confidence` is clamped to
/// `[0, 1]` on the way in.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmotionSample {
    /// Dominant label for the frame
    pub label: EmotionLabel,
    /// Classifier confidence in `[0, 1]`
    pub confidence: f32,
    /// When the source frame was captured
    pub captured_at: DateTime<Utc>,
    /// Per-label scores, when the backend exposes them
    pub raw_scores: Option<BTreeMap<EmotionLabel, f32>>,
}

impl EmotionSample {
    /// Create a sample without raw scores
    #[must_use]
    pub fn new(label: EmotionLabel, confidence: f32, captured_at: DateTime<Utc>) -> Self {
        Self {
            label,
            confidence: clamp_unit(confidence),
            captured_at,
            raw_scores: None,
        }
    }

    /// Attach per-label scores
    #[must_use]
    pub fn with_scores(mut self, scores: BTreeMap<EmotionLabel, f32>) -> Self {
        self.raw_scores = Some(scores);
        self
    }

    /// Confidence as a whole percentage, for display
    #[must_use]
    pub fn confidence_percent(&self) -> u8 {
        // clamp_unit guarantees 0..=100 after rounding
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let pct = (self.confidence * 100.0).round() as u8;
        pct
    }
}

fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Newest-first bounded history of samples
#[derive(Clone, Debug)]
pub struct RecentSamples {
    items: VecDeque<EmotionSample>,
    capacity: usize,
}

impl RecentSamples {
    /// Create a history holding at most `capacity` samples (minimum 1)
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record a sample, evicting the oldest one when full
    pub fn record(&mut self, sample: EmotionSample) {
        if self.items.len() == self.capacity {
            self.items.pop_back();
        }
        self.items.push_front(sample);
    }

    /// Samples, newest first
    pub fn iter(&self) -> impl Iterator<Item = &EmotionSample> {
        self.items.iter()
    }

    /// Most recent sample
    #[must_use]
    pub fn latest(&self) -> Option<&EmotionSample> {
        self.items.front()
    }

    /// Number of samples held
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether no samples are held
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Forget everything
    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl Default for RecentSamples {
    fn default() -> Self {
        Self::new(DEFAULT_RECENT_CAPACITY)
    }
}
