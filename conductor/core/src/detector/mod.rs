//! Emotion Detection
//!
//! Turns camera frames into normalized [`EmotionSample`](crate::emotion::EmotionSample)s.
//!
//! # Architecture
//!
//! ```text
//!   FrameSource ──► DetectionTicker ──► DetectorAdapter<B> ──► mpsc<EmotionSample>
//!                      (interval)          │
//!                                          ▼
//!                                   EmotionBackend
//!                       ┌──────────────┼──────────────┐
//!                 Blendshape       Expression        Cnn
//!                       └──────── ModelProbe (HTTP) ──┘
//! ```
//!
//! # Available Backends
//!
//! - **Blendshape**: face-mesh coefficients scored by heuristics
//! - **Expression**: landmark detector plus expression net
//! - **Cnn**: FER-2013 softmax argmax

mod adapter;
mod blendshape;
mod cnn;
mod expression;
mod probe;
mod ticker;
mod traits;

use std::time::Duration;

use thiserror::Error;

pub use adapter::{AdapterState, DetectorAdapter, DEFAULT_INIT_TIMEOUT};
pub use blendshape::BlendshapeBackend;
pub use cnn::{CnnBackend, ComputeTarget, FER_ORDER};
pub use expression::ExpressionBackend;
pub use probe::{parse_manifest, HttpModelProbe};
pub use ticker::{DetectionTicker, DEFAULT_TICK_INTERVAL};
pub use traits::{
    BackendKind, Classification, EmotionBackend, FrameFeatures, FrameSource, ModelManifest,
    ModelProbe, ModelSource, VideoFrame,
};

/// Detector failure
#[derive(Debug, Error)]
pub enum DetectorError {
    /// Model source could not be reached
    #[error("model source {location} unreachable: {reason}")]
    Unreachable {
        /// URL or source name
        location: String,
        /// What went wrong
        reason: String,
    },

    /// Weights manifest was not usable
    #[error("invalid model manifest: {0}")]
    InvalidManifest(String),

    /// Backend could not load from a reachable source
    #[error("model load failed: {0}")]
    LoadFailed(String),

    /// Every configured source failed
    #[error("all {attempts} model sources failed")]
    AllSourcesFailed {
        /// Sources tried
        attempts: usize,
    },

    /// Setup exceeded its bound
    #[error("initialization timed out after {0:?}")]
    Timeout(Duration),

    /// Classify called before load
    #[error("model not loaded")]
    NotLoaded,

    /// Frame carried output this backend cannot read
    #[error("{backend} backend cannot read these frame features")]
    UnsupportedFeatures {
        /// Backend that rejected the frame
        backend: BackendKind,
    },

    /// Transport failure while probing
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}
